//! User operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::User;

impl Database {
    /// Look up a user by phone number
    pub fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        let conn = self.conn()?;

        let user = conn
            .query_row(
                "SELECT id, phone_number, name, is_first_time, created_at FROM users WHERE phone_number = ?",
                params![phone],
                Self::row_to_user,
            )
            .optional()?;

        Ok(user)
    }

    /// Look up a user by id
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;

        let user = conn
            .query_row(
                "SELECT id, phone_number, name, is_first_time, created_at FROM users WHERE id = ?",
                params![id],
                Self::row_to_user,
            )
            .optional()?;

        Ok(user)
    }

    /// Fetch the user for `phone`, creating it on first contact
    ///
    /// Returns the user and whether it was created by this call. New users get
    /// a placeholder name built from the last four digits.
    pub fn get_or_create_user(&self, phone: &str, now: DateTime<Utc>) -> Result<(User, bool)> {
        let conn = self.conn()?;

        let tail: String = {
            let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
            digits[digits.len().saturating_sub(4)..].iter().collect()
        };
        let name = format!("User {}", tail);

        // INSERT OR IGNORE so concurrent first messages converge on one row
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (phone_number, name, is_first_time, created_at) VALUES (?, ?, 1, ?)",
            params![phone, name, format_datetime(now)],
        )?;

        let user = conn.query_row(
            "SELECT id, phone_number, name, is_first_time, created_at FROM users WHERE phone_number = ?",
            params![phone],
            Self::row_to_user,
        )?;

        Ok((user, inserted == 1))
    }

    /// Clear the first-time flag if it is still set
    ///
    /// Compare-and-set: returns true only for the single caller that flipped
    /// the flag, so the onboarding welcome goes out once per user.
    pub fn consume_first_time(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE users SET is_first_time = 0 WHERE id = ? AND is_first_time = 1",
            params![user_id],
        )?;

        Ok(changed == 1)
    }

    /// Count all users
    pub fn count_users(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let created_at: String = row.get(4)?;
        Ok(User {
            id: row.get(0)?,
            phone_number: row.get(1)?,
            name: row.get(2)?,
            is_first_time: row.get(3)?,
            created_at: parse_datetime(&created_at, 4)?,
        })
    }
}
