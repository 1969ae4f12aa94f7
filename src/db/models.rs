use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer primary keys, typed per table so a photo id can't be passed where
/// an album id is expected.
macro_rules! row_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map($name)
            }
        }
    };
}

row_id!(UserId);
row_id!(PhotoId);
row_id!(AlbumId);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub const COLUMNS: &'static str =
        "id, username, email, password_hash, first_name, last_name, is_active, date_joined";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            first_name: row.get(4)?,
            last_name: row.get(5)?,
            is_active: row.get(6)?,
            date_joined: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&PhotoId(42)).unwrap();
        assert_eq!(json, "42");
        let back: AlbumId = serde_json::from_str("7").unwrap();
        assert_eq!(back, AlbumId(7));
    }

    #[test]
    fn user_serialization_hides_password_hash() {
        let user = User {
            id: UserId(1),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$2b$04$secret".into(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            date_joined: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
    }
}
