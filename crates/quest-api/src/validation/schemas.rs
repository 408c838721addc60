//! Schemas for every request DTO the API accepts.

use std::sync::LazyLock;

use quest_db::TaskSort;
use quest_types::api::{
    AdminUpdateUserRequest, AnnouncementRequest, ChangePasswordRequest, CreateTaskRequest,
    ForgotPasswordRequest, FriendRequestCreate, IdParam, LeaderboardQuery, LoginRequest,
    NotificationQuery, RefreshRequest, RegisterRequest, ResetPasswordRequest, ResetTokenParam,
    TaskQuery, UpdateProfileRequest, UpdateTaskRequest, UserIdParam, UserSearchQuery,
};

use super::{FieldRule, Schema, Validate, Validator};
use crate::pagination::MAX_PAGE_SIZE;

const PASSWORD_RULE: &str =
    "Password must contain at least one uppercase letter, one lowercase letter, and one number";

macro_rules! validated {
    ($ty:ty => $schema:expr) => {
        impl Validate for $ty {
            fn validator() -> &'static Validator {
                static VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
                    Validator::compile($schema)
                        .expect(concat!("schema for ", stringify!($ty), " compiles"))
                });
                &VALIDATOR
            }
        }
    };
}

fn email() -> FieldRule {
    FieldRule::string("email").required().trim().lowercase().email()
}

fn new_password(name: &str) -> FieldRule {
    FieldRule::string(name)
        .required()
        .min_length(8)
        .max_length(128)
        .pattern("[a-z]", PASSWORD_RULE)
        .pattern("[A-Z]", PASSWORD_RULE)
        .pattern("[0-9]", PASSWORD_RULE)
}

fn confirmation(of: &str) -> FieldRule {
    FieldRule::string("confirmPassword")
        .required()
        .equals_field(of, "Passwords do not match")
}

fn page() -> FieldRule {
    FieldRule::integer("page").min(1.0)
}

fn limit() -> FieldRule {
    FieldRule::integer("limit").min(1.0).max(f64::from(MAX_PAGE_SIZE))
}

fn user_name() -> FieldRule {
    FieldRule::string("name").trim().min_length(2).max_length(50)
}

fn task_schema() -> Schema {
    Schema::new(vec![
        FieldRule::string("title").required().trim().min_length(3).max_length(100),
        FieldRule::string("description").trim().allow_empty().max_length(1000),
        FieldRule::string("category").trim().max_length(50),
        FieldRule::string("priority").one_of(&["low", "medium", "high"]),
        FieldRule::integer("points").min(1.0).max(1000.0),
        FieldRule::date("dueDate"),
    ])
}

// -- Auth --

validated!(RegisterRequest => Schema::new(vec![
    user_name().required(),
    email(),
    new_password("password"),
    confirmation("password"),
]));

validated!(LoginRequest => Schema::new(vec![
    email(),
    FieldRule::string("password").required(),
]));

validated!(RefreshRequest => Schema::new(vec![
    FieldRule::string("refreshToken").required().trim(),
]));

validated!(ForgotPasswordRequest => Schema::new(vec![email()]));

validated!(ResetPasswordRequest => Schema::new(vec![
    new_password("password"),
    confirmation("password"),
]));

validated!(ResetTokenParam => Schema::new(vec![
    FieldRule::string("token").required().pattern("^[0-9a-f]{64}$", "Invalid or expired reset token"),
]));

validated!(ChangePasswordRequest => Schema::new(vec![
    FieldRule::string("currentPassword").required(),
    new_password("newPassword"),
    confirmation("newPassword"),
]));

// -- Shared --

validated!(IdParam => Schema::new(vec![FieldRule::string("id").required().object_id()]));

validated!(UserIdParam => Schema::new(vec![
    FieldRule::string("userId").required().object_id(),
]));

// -- Users --

validated!(UserSearchQuery => Schema::new(vec![
    FieldRule::string("search").trim().max_length(100),
    page(),
    limit(),
]));

validated!(LeaderboardQuery => Schema::new(vec![limit()]));

validated!(UpdateProfileRequest => Schema::new(vec![
    user_name(),
    FieldRule::string("bio").trim().allow_empty().max_length(500),
    FieldRule::string("avatar").trim().allow_empty().max_length(500),
])
.partial());

// -- Tasks --

validated!(CreateTaskRequest => task_schema());

validated!(UpdateTaskRequest => task_schema()
    .partial()
    .field(FieldRule::string("status").one_of(&["pending", "in_progress"])));

validated!(TaskQuery => Schema::new(vec![
    FieldRule::string("status")
        .multiple()
        .one_of(&["pending", "in_progress", "completed"]),
    FieldRule::string("priority")
        .multiple()
        .one_of(&["low", "medium", "high"]),
    FieldRule::string("sort").one_of(&TaskSort::PARAMS),
    page(),
    limit(),
]));

// -- Friends --

validated!(FriendRequestCreate => Schema::new(vec![
    FieldRule::string("userId").required().object_id(),
]));

// -- Notifications --

validated!(NotificationQuery => Schema::new(vec![
    FieldRule::boolean("unread"),
    page(),
    limit(),
]));

// -- Admin --

validated!(AdminUpdateUserRequest => Schema::new(vec![
    FieldRule::string("role").one_of(&["user", "admin"]),
    FieldRule::boolean("active"),
])
.partial());

validated!(AnnouncementRequest => Schema::new(vec![
    FieldRule::string("title").required().trim().max_length(100),
    FieldRule::string("message").required().trim().max_length(1000),
    FieldRule::string("recipientId").object_id(),
]));
