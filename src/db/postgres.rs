//! PostgreSQL implementation of [`Database`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use secrecy::ExposeSecret;
use tokio_postgres::{NoTls, Row};

use crate::config::DatabaseConfig;
use crate::db::Database;
use crate::error::DatabaseError;
use crate::models::{
    CandidateTicket, Contact, ContactAttribute, CustomField, Message, NewSchedule, Prompt, Queue,
    Schedule, Ticket, TicketDetails, TicketStatus,
};

mod embedded {
    refinery::embed_migrations!("migrations");
}

const TICKET_COLUMNS: &str = "t.id AS t_id, t.tenant_id AS t_tenant_id, t.status AS t_status, \
     t.updated_at AS t_updated_at, t.in_progress AS t_in_progress, t.contact_id AS t_contact_id, \
     t.queue_id AS t_queue_id, t.session_id AS t_session_id, t.user_id AS t_user_id";

const CONTACT_COLUMNS: &str = "c.id AS c_id, c.tenant_id AS c_tenant_id, c.name AS c_name, \
     c.number AS c_number, c.email AS c_email, c.profile_pic_url AS c_profile_pic_url";

/// Database store backed by a deadpool connection pool.
pub struct Store {
    pool: Pool,
}

impl Store {
    /// Create a new store and connect to the database.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url.expose_secret().to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        // Test connection
        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut conn = self.conn().await?;
        let report = embedded::migrations::runner()
            .run_async(&mut **conn)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        for migration in report.applied_migrations() {
            tracing::info!(
                version = migration.version(),
                name = migration.name(),
                "Applied migration"
            );
        }
        Ok(())
    }

    /// Get a connection from the pool.
    pub async fn conn(&self) -> Result<deadpool_postgres::Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }

    /// Custom fields of several contacts, grouped by contact id.
    async fn custom_fields_for(
        &self,
        contact_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<CustomField>>, DatabaseError> {
        if contact_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT contact_id, name, value FROM contact_custom_fields \
                 WHERE contact_id = ANY($1) ORDER BY id",
                &[&contact_ids],
            )
            .await?;

        let mut grouped: HashMap<i64, Vec<CustomField>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.get("contact_id"))
                .or_default()
                .push(CustomField {
                    name: row.get("name"),
                    value: row.get("value"),
                });
        }
        Ok(grouped)
    }
}

fn ticket_from_row(row: &Row) -> Ticket {
    let status: String = row.get("t_status");
    Ticket {
        id: row.get("t_id"),
        tenant_id: row.get("t_tenant_id"),
        status: TicketStatus::from(status.as_str()),
        updated_at: row.get("t_updated_at"),
        in_progress: row.get("t_in_progress"),
        contact_id: row.get("t_contact_id"),
        queue_id: row.get("t_queue_id"),
        session_id: row.get("t_session_id"),
        user_id: row.get("t_user_id"),
    }
}

fn contact_from_row(row: &Row) -> Contact {
    Contact {
        id: row.get("c_id"),
        tenant_id: row.get("c_tenant_id"),
        name: row.get("c_name"),
        number: row.get("c_number"),
        email: row.get("c_email"),
        profile_pic_url: row.get("c_profile_pic_url"),
        custom_fields: Vec::new(),
    }
}

fn message_from_row(row: &Row) -> Message {
    Message {
        id: row.get("id"),
        ticket_id: row.get("ticket_id"),
        body: row.get("body"),
        from_me: row.get("from_me"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl Database for Store {
    async fn find_stale_open_tickets(
        &self,
        tenant_id: Option<i64>,
    ) -> Result<Vec<CandidateTicket>, DatabaseError> {
        let conn = self.conn().await?;
        let query = format!(
            "SELECT {TICKET_COLUMNS}, {CONTACT_COLUMNS}, \
                    q.id AS q_id, q.name AS q_name, p.id AS p_id, p.name AS p_name \
             FROM tickets t \
             JOIN contacts c ON c.id = t.contact_id \
             JOIN queues q ON q.id = t.queue_id \
             JOIN prompts p ON p.id = q.prompt_id \
             WHERE t.status = 'open' AND t.in_progress = FALSE \
               AND ($1::BIGINT IS NULL OR t.tenant_id = $1) \
             ORDER BY t.id"
        );
        let rows = conn.query(query.as_str(), &[&tenant_id]).await?;
        drop(conn);

        let contact_ids: Vec<i64> = rows.iter().map(|r| r.get("c_id")).collect();
        let fields = self.custom_fields_for(&contact_ids).await?;

        let candidates = rows
            .iter()
            .map(|row| {
                let mut contact = contact_from_row(row);
                contact.custom_fields = fields.get(&contact.id).cloned().unwrap_or_default();
                let prompt = Prompt {
                    id: row.get("p_id"),
                    name: row.get("p_name"),
                };
                CandidateTicket {
                    ticket: ticket_from_row(row),
                    contact,
                    queue: Queue {
                        id: row.get("q_id"),
                        name: row.get("q_name"),
                        prompt: Some(prompt.clone()),
                    },
                    prompt,
                }
            })
            .collect();

        Ok(candidates)
    }

    async fn find_ticket(
        &self,
        ticket_id: i64,
        tenant_id: i64,
    ) -> Result<Option<TicketDetails>, DatabaseError> {
        let conn = self.conn().await?;
        let query = format!(
            "SELECT {TICKET_COLUMNS}, {CONTACT_COLUMNS} \
             FROM tickets t LEFT JOIN contacts c ON c.id = t.contact_id \
             WHERE t.id = $1 AND t.tenant_id = $2"
        );
        let Some(row) = conn.query_opt(query.as_str(), &[&ticket_id, &tenant_id]).await? else {
            return Ok(None);
        };
        drop(conn);

        let ticket = ticket_from_row(&row);
        let contact = match row.get::<_, Option<i64>>("c_id") {
            Some(contact_id) => {
                let mut contact = contact_from_row(&row);
                contact.custom_fields = self
                    .custom_fields_for(&[contact_id])
                    .await?
                    .remove(&contact_id)
                    .unwrap_or_default();
                Some(contact)
            }
            None => None,
        };

        Ok(Some(TicketDetails { ticket, contact }))
    }

    async fn set_in_progress(
        &self,
        ticket_id: i64,
        in_progress: bool,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE tickets SET in_progress = $2, \
                 in_progress_since = CASE WHEN $2 THEN NOW() ELSE NULL END \
             WHERE id = $1",
            &[&ticket_id, &in_progress],
        )
        .await?;
        Ok(())
    }

    async fn clear_in_progress(&self, ticket_ids: &[i64]) -> Result<(), DatabaseError> {
        if ticket_ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE tickets SET in_progress = FALSE, in_progress_since = NULL \
             WHERE id = ANY($1)",
            &[&ticket_ids],
        )
        .await?;
        Ok(())
    }

    async fn release_abandoned_markers(
        &self,
        marked_before: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let conn = self.conn().await?;
        let count = conn
            .execute(
                "UPDATE tickets SET in_progress = FALSE, in_progress_since = NULL \
                 WHERE in_progress = TRUE \
                   AND (in_progress_since IS NULL OR in_progress_since < $1)",
                &[&marked_before],
            )
            .await?;
        Ok(count)
    }

    async fn latest_inbound_message(
        &self,
        ticket_id: i64,
    ) -> Result<Option<Message>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, ticket_id, body, from_me, created_at, updated_at FROM messages \
                 WHERE ticket_id = $1 AND from_me = FALSE \
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                &[&ticket_id],
            )
            .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn pending_inbound_messages(
        &self,
        ticket_id: i64,
    ) -> Result<Vec<Message>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT id, ticket_id, body, from_me, created_at, updated_at FROM messages \
                 WHERE ticket_id = $1 ORDER BY created_at DESC, id DESC",
                &[&ticket_id],
            )
            .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn find_contact(&self, contact_id: i64) -> Result<Option<Contact>, DatabaseError> {
        let conn = self.conn().await?;
        let query = format!("SELECT {CONTACT_COLUMNS} FROM contacts c WHERE c.id = $1");
        let Some(row) = conn.query_opt(query.as_str(), &[&contact_id]).await? else {
            return Ok(None);
        };
        drop(conn);

        let mut contact = contact_from_row(&row);
        contact.custom_fields = self
            .custom_fields_for(&[contact_id])
            .await?
            .remove(&contact_id)
            .unwrap_or_default();
        Ok(Some(contact))
    }

    async fn update_contact_attribute(
        &self,
        contact_id: i64,
        attribute: ContactAttribute,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        let query = format!(
            "UPDATE contacts SET {} = $2, updated_at = NOW() WHERE id = $1",
            attribute.column()
        );
        let updated = conn.execute(query.as_str(), &[&contact_id, &value]).await?;
        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "contact",
                id: contact_id,
            });
        }
        Ok(())
    }

    async fn upsert_custom_field(
        &self,
        contact_id: i64,
        name: &str,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO contact_custom_fields (contact_id, name, value) VALUES ($1, $2, $3) \
             ON CONFLICT (contact_id, name) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
            &[&contact_id, &name, &value],
        )
        .await?;
        Ok(())
    }

    async fn create_schedule(&self, record: &NewSchedule) -> Result<Schedule, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO schedules (body, send_at, contact_id, tenant_id, user_id) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, body, send_at, contact_id, tenant_id, user_id, created_at",
                &[
                    &record.body,
                    &record.send_at,
                    &record.contact_id,
                    &record.tenant_id,
                    &record.user_id,
                ],
            )
            .await?;

        Ok(Schedule {
            id: row.get("id"),
            body: row.get("body"),
            send_at: row.get("send_at"),
            contact_id: row.get("contact_id"),
            tenant_id: row.get("tenant_id"),
            user_id: row.get("user_id"),
            created_at: row.get("created_at"),
        })
    }

    async fn count_schedules_at(
        &self,
        send_at: DateTime<Utc>,
        tenant_id: i64,
    ) -> Result<i64, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) AS total FROM schedules WHERE send_at = $1 AND tenant_id = $2",
                &[&send_at, &tenant_id],
            )
            .await?;
        Ok(row.get("total"))
    }
}
