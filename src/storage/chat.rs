//! Donor/patient chat rooms and their messages

use rusqlite::{params, Row};
use uuid::Uuid;

use super::database::{now, optional, parse_col, required, ts, Database};
use super::error::{StorageError, StorageResult};
use crate::domain::{ChatRoom, Message};

const ROOM_COLUMNS: &str = "id, donor_id, patient_id, donation_id, is_active, created_at";
const MESSAGE_COLUMNS: &str = "id, chat_room_id, sender_id, content, timestamp";

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRoom> {
    Ok(ChatRoom {
        id: parse_col(row, 0)?,
        donor_id: parse_col(row, 1)?,
        patient_id: parse_col(row, 2)?,
        donation_id: parse_col(row, 3)?,
        is_active: row.get(4)?,
        created_at: parse_col(row, 5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: parse_col(row, 0)?,
        chat_room_id: parse_col(row, 1)?,
        sender_id: parse_col(row, 2)?,
        content: row.get(3)?,
        timestamp: parse_col(row, 4)?,
    })
}

impl Database {
    /// One room per donation; returns `(room, created)`
    pub fn get_or_create_chat_room(
        &self,
        donation_id: Uuid,
        donor_id: Uuid,
        patient_id: Uuid,
    ) -> StorageResult<(ChatRoom, bool)> {
        if let Some(room) = self.find_chat_room_for_donation(donation_id)? {
            return Ok((room, false));
        }

        let room = ChatRoom {
            id: Uuid::new_v4(),
            donor_id,
            patient_id,
            donation_id,
            is_active: true,
            created_at: now(),
        };
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO chat_rooms ({ROOM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, 1, ?5)"),
            params![
                room.id.to_string(),
                room.donor_id.to_string(),
                room.patient_id.to_string(),
                room.donation_id.to_string(),
                ts(&room.created_at),
            ],
        )?;

        tracing::info!(room_id = %room.id, donation_id = %donation_id, "Chat room opened");
        Ok((room, true))
    }

    pub fn get_chat_room(&self, id: Uuid) -> StorageResult<ChatRoom> {
        let conn = self.conn()?;
        required(
            conn.query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = ?1"),
                [id.to_string()],
                room_from_row,
            ),
            "Chat room",
            id,
        )
    }

    pub fn find_chat_room_for_donation(
        &self,
        donation_id: Uuid,
    ) -> StorageResult<Option<ChatRoom>> {
        let conn = self.conn()?;
        optional(conn.query_row(
            &format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE donation_id = ?1"),
            [donation_id.to_string()],
            room_from_row,
        ))
    }

    /// Rooms where the user is donor or patient, newest first
    pub fn list_chat_rooms_for_user(&self, user_id: Uuid) -> StorageResult<Vec<ChatRoom>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE donor_id = ?1 OR patient_id = ?1 \
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rooms = stmt
            .query_map([user_id.to_string()], room_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rooms)
    }

    pub fn set_chat_room_active(&self, id: Uuid, active: bool) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE chat_rooms SET is_active = ?2 WHERE id = ?1",
            params![id.to_string(), active],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("Chat room", id));
        }
        tracing::debug!(room_id = %id, active, "Chat room state changed");
        Ok(())
    }

    pub fn create_message(
        &self,
        chat_room_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> StorageResult<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            chat_room_id,
            sender_id,
            content: content.to_string(),
            timestamp: now(),
        };
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
            params![
                message.id.to_string(),
                message.chat_room_id.to_string(),
                message.sender_id.to_string(),
                message.content,
                ts(&message.timestamp),
            ],
        )?;
        Ok(message)
    }

    /// Messages in send order
    pub fn list_messages(&self, chat_room_id: Uuid) -> StorageResult<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_room_id = ?1 \
             ORDER BY timestamp, rowid"
        ))?;
        let messages = stmt
            .query_map([chat_room_id.to_string()], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}
