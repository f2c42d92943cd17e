use actix_web::{web, HttpResponse};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::api::auth::AuthUser;
use crate::db::models::{Course, CourseForm, NewCourse};
use crate::db::schema::courses;
use crate::db::{connection, DbConnection, DbPool};
use crate::error::ApiError;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/courses")
            .service(
                web::resource("/")
                    .route(web::get().to(list_courses))
                    .route(web::post().to(create_course)),
            )
            .service(
                web::resource("/{id}/")
                    .route(web::get().to(get_course))
                    .route(web::put().to(update_course))
                    .route(web::delete().to(delete_course)),
            ),
    );
}

fn validate(form: &CourseForm) -> Result<(), ApiError> {
    if form.title.trim().is_empty() {
        return Err(ApiError::validation("title", "This field may not be blank."));
    }
    if form.title.chars().count() > 200 {
        return Err(ApiError::validation(
            "title",
            "Ensure this field has no more than 200 characters.",
        ));
    }
    Ok(())
}

/// Only the creator or an admin may change a course.
async fn ensure_owner(
    conn: &mut DbConnection,
    course_id: i32,
    auth: &AuthUser,
) -> Result<(), ApiError> {
    let created_by: Option<i32> = courses::table
        .find(course_id)
        .select(courses::created_by)
        .first(conn)
        .await?;

    if created_by == Some(auth.user_id) || auth.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "You do not have permission to perform this action.".to_string(),
        ))
    }
}

async fn list_courses(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = &mut connection(&pool).await?;
    let list = courses::table
        .select(Course::as_select())
        .order_by(courses::course_id.asc())
        .load(conn)
        .await?;
    Ok(HttpResponse::Ok().json(list))
}

async fn create_course(
    auth: AuthUser,
    body: web::Json<CourseForm>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let form = body.into_inner();
    validate(&form)?;

    let conn = &mut connection(&pool).await?;
    let course = diesel::insert_into(courses::table)
        .values(&NewCourse {
            form,
            created_by: Some(auth.user_id),
        })
        .returning(Course::as_returning())
        .get_result(conn)
        .await?;
    Ok(HttpResponse::Created().json(course))
}

async fn get_course(
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let conn = &mut connection(&pool).await?;
    let course = courses::table
        .find(path.into_inner())
        .select(Course::as_select())
        .first(conn)
        .await?;
    Ok(HttpResponse::Ok().json(course))
}

async fn update_course(
    auth: AuthUser,
    path: web::Path<i32>,
    body: web::Json<CourseForm>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let course_id = path.into_inner();
    let form = body.into_inner();
    validate(&form)?;

    let conn = &mut connection(&pool).await?;
    ensure_owner(conn, course_id, &auth).await?;
    let course = diesel::update(courses::table.find(course_id))
        .set(&form)
        .returning(Course::as_returning())
        .get_result(conn)
        .await?;
    Ok(HttpResponse::Ok().json(course))
}

async fn delete_course(
    auth: AuthUser,
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let course_id = path.into_inner();
    let conn = &mut connection(&pool).await?;
    ensure_owner(conn, course_id, &auth).await?;
    diesel::delete(courses::table.find(course_id))
        .execute(conn)
        .await?;
    log::info!("User {} deleted course {}", auth.user_id, course_id);
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(title: &str) -> CourseForm {
        CourseForm {
            title: title.to_string(),
            description: String::new(),
            category: None,
            level: None,
            instructor_id: None,
        }
    }

    #[test]
    fn blank_or_long_titles_are_rejected() {
        assert!(validate(&form("Rust 101")).is_ok());
        assert!(validate(&form("   ")).is_err());
        assert!(validate(&form(&"x".repeat(201))).is_err());
    }

    #[test]
    fn course_form_reads_instructor_key() {
        let form: CourseForm =
            serde_json::from_str(r#"{"title": "ML", "instructor": 4, "level": "basic"}"#).unwrap();
        assert_eq!(form.instructor_id, Some(4));
        assert_eq!(form.description, "");
        assert_eq!(form.level.as_deref(), Some("basic"));
    }
}
