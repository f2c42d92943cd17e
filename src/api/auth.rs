use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use futures::future::{ready, Ready};
use serde::Deserialize;

use crate::db::models::{NewUser, User};
use crate::db::schema::users;
use crate::db::{connection, DbPool};
use crate::error::ApiError;
use crate::services::auth::{hash_password, verify_password, JwtKeys};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register/", web::post().to(register))
            .route("/login/", web::post().to(login)),
    )
    .route("/users/me/", web::get().to(me));
}

/// The caller identified by a valid `Authorization: Bearer` token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, ApiError> {
    let keys = req
        .app_data::<web::Data<JwtKeys>>()
        .ok_or_else(|| ApiError::Internal("JWT keys are not configured".to_string()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
        })?;

    let claims = keys.verify(token)?;
    let user_id = claims
        .sub
        .parse::<i32>()
        .map_err(|_| ApiError::Unauthorized("Token contained no recognizable user identification".to_string()))?;

    Ok(AuthUser {
        user_id,
        role: claims.role,
    })
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Lowercases the domain part, leaving the local part as typed.
pub fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(format!("{}@{}", local, domain.to_lowercase()))
        }
        _ => Err(ApiError::validation("email", "Enter a valid email address.")),
    }
}

async fn register(
    body: web::Json<RegisterRequest>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    if body.name.trim().is_empty() {
        return Err(ApiError::validation("name", "This field may not be blank."));
    }
    let role = body.role.unwrap_or_else(|| "student".to_string());
    if !matches!(role.as_str(), "student" | "instructor") {
        return Err(ApiError::validation(
            "role",
            format!("\"{role}\" is not a valid choice."),
        ));
    }

    let new_user = NewUser {
        name: body.name.trim().to_string(),
        email: normalize_email(&body.email)?,
        password: hash_password(&body.password)?,
        role,
        profile_picture: body.profile_picture,
    };

    let conn = &mut connection(&pool).await?;
    let user = diesel::insert_into(users::table)
        .values(&new_user)
        .returning(User::as_returning())
        .get_result(conn)
        .await?;

    log::info!("Registered user {} ({})", user.user_id, user.role);
    Ok(HttpResponse::Created().json(user))
}

async fn login(
    body: web::Json<LoginRequest>,
    pool: web::Data<DbPool>,
    keys: web::Data<JwtKeys>,
) -> Result<HttpResponse, ApiError> {
    let email = normalize_email(&body.email)?;
    let conn = &mut connection(&pool).await?;
    let user = users::table
        .filter(users::email.eq(&email))
        .select(User::as_select())
        .first(conn)
        .await
        .optional()?;

    let invalid = || ApiError::Unauthorized("No active account found with the given credentials".to_string());
    let user = user.ok_or_else(invalid)?;
    if !user.is_active || !verify_password(&body.password, &user.password) {
        return Err(invalid());
    }

    let role = if user.is_superuser { "admin" } else { user.role.as_str() };
    Ok(HttpResponse::Ok().json(keys.issue(user.user_id, &user.email, role)?))
}

async fn me(auth: AuthUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = &mut connection(&pool).await?;
    let user = users::table
        .find(auth.user_id)
        .select(User::as_select())
        .first(conn)
        .await?;
    Ok(HttpResponse::Ok().json(user))
}
