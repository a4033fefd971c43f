use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: Uuid,                   // minted by the service, never by the store
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[sqlx(rename = "password")]
    pub password_hash: String,      // Argon2 PHC string, never plaintext
    pub created_at: OffsetDateTime, // fixed at creation
    pub updated_at: OffsetDateTime, // refreshed on every update
}
