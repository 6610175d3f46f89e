use actix_web::{post, web, HttpResponse};

use crate::error::Result;
use crate::middleware::UserId;
use crate::models::NewPost;
use crate::services::PostAnnouncer;

#[post("/posts")]
pub async fn create_post(
    user: UserId,
    body: web::Json<NewPost>,
    announcer: web::Data<PostAnnouncer>,
) -> Result<HttpResponse> {
    let post = announcer.announce(user.0, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(post))
}
