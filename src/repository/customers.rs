use std::collections::HashSet;

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::ImportMode;

/// A single normalized, validated CSV data row ready to be written to
/// `customers`, paired elsewhere with its 1-based source row number.
#[derive(Debug, Clone)]
pub struct CustomerRow {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
}

/// Flushes one batch in its own transaction and returns the rows rejected at
/// flush time (in `insert_only` mode, rows whose email already exists),
/// keyed by the row's original 1-based position and raw source line so the
/// caller can fold them into the error report verbatim. Earlier successful
/// flushes are never rolled back by a later one — each call commits
/// independently.
pub async fn flush_batch(
    pool: &PgPool,
    mode: ImportMode,
    rows: Vec<(i64, String, CustomerRow)>,
) -> Result<Vec<(i64, String, String)>, sqlx::Error> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await?;
    let mut rejected = Vec::new();

    let to_write = match mode {
        ImportMode::InsertOnly => {
            let emails: Vec<String> = rows.iter().map(|(_, _, c)| c.email.clone()).collect();
            let existing: Vec<String> = sqlx::query_scalar!("SELECT email FROM customers WHERE email = ANY($1::text[])", &emails)
                .fetch_all(&mut *tx)
                .await?;
            let existing: HashSet<String> = existing.into_iter().collect();

            let mut keep = Vec::with_capacity(rows.len());
            for (row, raw, customer) in rows {
                if existing.contains(&customer.email) {
                    rejected.push((row, format!("email already exists \"{}\"", customer.email), raw));
                } else {
                    keep.push((row, raw, customer));
                }
            }
            keep
        }
        ImportMode::Upsert => rows,
    };

    if !to_write.is_empty() {
        let ids: Vec<Uuid> = to_write.iter().map(|_| Uuid::new_v4()).collect();
        let emails: Vec<String> = to_write.iter().map(|(_, _, c)| c.email.clone()).collect();
        let first_names: Vec<Option<String>> = to_write.iter().map(|(_, _, c)| c.first_name.clone()).collect();
        let last_names: Vec<Option<String>> = to_write.iter().map(|(_, _, c)| c.last_name.clone()).collect();
        let phones: Vec<Option<String>> = to_write.iter().map(|(_, _, c)| c.phone.clone()).collect();
        let cities: Vec<Option<String>> = to_write.iter().map(|(_, _, c)| c.city.clone()).collect();

        match mode {
            ImportMode::InsertOnly => {
                sqlx::query!(
                    r#"
                    INSERT INTO customers (id, email, first_name, last_name, phone, city, created_at, updated_at)
                    SELECT id, email, first_name, last_name, phone, city, now(), now()
                    FROM UNNEST($1::uuid[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[])
                        AS t(id, email, first_name, last_name, phone, city)
                    "#,
                    &ids,
                    &emails,
                    &first_names as &[Option<String>],
                    &last_names as &[Option<String>],
                    &phones as &[Option<String>],
                    &cities as &[Option<String>],
                )
                .execute(&mut *tx)
                .await?;
            }
            ImportMode::Upsert => {
                sqlx::query!(
                    r#"
                    INSERT INTO customers (id, email, first_name, last_name, phone, city, created_at, updated_at)
                    SELECT id, email, first_name, last_name, phone, city, now(), now()
                    FROM UNNEST($1::uuid[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[])
                        AS t(id, email, first_name, last_name, phone, city)
                    ON CONFLICT (email) DO UPDATE SET
                        first_name = excluded.first_name,
                        last_name = excluded.last_name,
                        phone = excluded.phone,
                        city = excluded.city,
                        updated_at = now()
                    "#,
                    &ids,
                    &emails,
                    &first_names as &[Option<String>],
                    &last_names as &[Option<String>],
                    &phones as &[Option<String>],
                    &cities as &[Option<String>],
                )
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    tx.commit().await?;
    Ok(rejected)
}
