diesel::table! {
    users (user_id) {
        user_id -> Int4,
        name -> Varchar,
        email -> Varchar,
        password -> Varchar,
        role -> Varchar,
        profile_picture -> Nullable<Varchar>,
        is_active -> Bool,
        is_staff -> Bool,
        is_superuser -> Bool,
        created_at -> Timestamp,
    }
}

diesel::table! {
    courses (course_id) {
        course_id -> Int4,
        title -> Varchar,
        description -> Text,
        category -> Nullable<Varchar>,
        level -> Nullable<Varchar>,
        created_by -> Nullable<Int4>,
        instructor_id -> Nullable<Int4>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    videos (video_id) {
        video_id -> Int4,
        course_id -> Nullable<Int4>,
        uploaded_by -> Nullable<Int4>,
        title -> Varchar,
        description -> Nullable<Text>,
        file_url -> Varchar,
        thumbnail_url -> Nullable<Varchar>,
        duration -> Nullable<Int4>,
        transcript -> Nullable<Text>,
        difficulty_level -> Nullable<Varchar>,
        tags -> Nullable<Jsonb>,
        embedding_vector -> Nullable<Array<Float4>>,
        uploaded_at -> Timestamp,
    }
}

diesel::table! {
    video_progress (id) {
        id -> Int4,
        user_id -> Int4,
        video_id -> Int4,
        watched_seconds -> Int4,
        completed -> Bool,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    likes (id) {
        id -> Int4,
        user_id -> Int4,
        video_id -> Int4,
        created_at -> Timestamp,
    }
}

diesel::table! {
    comments (id) {
        id -> Int4,
        user_id -> Int4,
        video_id -> Int4,
        text -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    bookmarks (id) {
        id -> Int4,
        user_id -> Int4,
        video_id -> Int4,
        created_at -> Timestamp,
    }
}

diesel::table! {
    ratings (id) {
        id -> Int4,
        user_id -> Int4,
        video_id -> Int4,
        rating -> Int4,
        created_at -> Timestamp,
    }
}

diesel::table! {
    search_logs (id) {
        id -> Int4,
        user_id -> Nullable<Int4>,
        query -> Varchar,
        searched_at -> Timestamp,
    }
}

diesel::joinable!(videos -> courses (course_id));
diesel::joinable!(videos -> users (uploaded_by));
diesel::joinable!(video_progress -> videos (video_id));
diesel::joinable!(likes -> videos (video_id));
diesel::joinable!(comments -> videos (video_id));
diesel::joinable!(bookmarks -> videos (video_id));
diesel::joinable!(ratings -> videos (video_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    courses,
    videos,
    video_progress,
    likes,
    comments,
    bookmarks,
    ratings,
    search_logs,
);
