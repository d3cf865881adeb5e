//! Read access to the storefront's user records.
//!
//! User management lives elsewhere; messaging only needs the id and the
//! display name. [`insert_user`] exists for seeding and tests.

use crate::{object_id_at, MessageError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use souk_types::ObjectId;

/// A user as seen by the messaging core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: ObjectId,
    /// Display name.
    pub user_name: String,
    pub email: Option<String>,
    pub created_at: String,
}

/// Parameters for inserting a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub user_name: String,
    pub email: Option<String>,
}

/// Inserts a user with a freshly generated id.
pub fn insert_user(conn: &Connection, new_user: &NewUser) -> Result<User, MessageError> {
    let id = ObjectId::generate();
    conn.query_row(
        "INSERT INTO users (id, user_name, email) VALUES (?1, ?2, ?3)
         RETURNING id, user_name, email, created_at",
        params![id.as_str(), new_user.user_name, new_user.email],
        map_row_to_user,
    )
    .map_err(MessageError::from_write)
}

/// Looks up a user, returning `None` if no such id exists.
pub fn find_user(conn: &Connection, id: &ObjectId) -> Result<Option<User>, MessageError> {
    let user = conn
        .query_row(
            "SELECT id, user_name, email, created_at FROM users WHERE id = ?1",
            [id.as_str()],
            map_row_to_user,
        )
        .optional()?;
    Ok(user)
}

/// Retrieves a user by id.
pub fn get_user(conn: &Connection, id: &ObjectId) -> Result<User, MessageError> {
    find_user(conn, id)?.ok_or_else(|| MessageError::NotFound(id.to_string()))
}

fn map_row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: object_id_at(row, 0)?,
        user_name: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{setup_db, user};

    #[test]
    fn user_lookup_round_trips_display_name() {
        let conn = setup_db();
        let alice = user(&conn, "alice");

        let fetched = get_user(&conn, &alice.id).expect("get failed");
        assert_eq!(fetched.user_name, "alice");
        assert_eq!(fetched.email.as_deref(), Some("alice@example.com"));
        assert_eq!(fetched, alice);
    }

    #[test]
    fn missing_user_is_not_found() {
        let conn = setup_db();
        let ghost = ObjectId::generate();

        assert!(find_user(&conn, &ghost).unwrap().is_none());
        match get_user(&conn, &ghost).unwrap_err() {
            MessageError::NotFound(id) => assert_eq!(id, ghost.to_string()),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_user_name_is_a_validation_error() {
        let conn = setup_db();
        user(&conn, "alice");
        let err = insert_user(
            &conn,
            &NewUser {
                user_name: "alice".to_string(),
                email: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, MessageError::Validation(_)), "got {err:?}");
    }
}
