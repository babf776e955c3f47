use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{Incident, IncidentKind, NewIncident},
};

pub async fn insert_incident(
    incident: &NewIncident,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Incident, SqliteDatabaseError> {
    let record = sqlx::query_as::<_, Incident>(
        "INSERT INTO incidents (kind, order_id, reference, details, created_at) VALUES (?, ?, ?, ?, ?) RETURNING id, \
         kind, order_id, reference, details, created_at",
    )
    .bind(incident.kind)
    .bind(incident.order_id)
    .bind(&incident.reference)
    .bind(&incident.details)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(record)
}

pub async fn fetch_incidents(
    kind: Option<IncidentKind>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Incident>, SqliteDatabaseError> {
    let mut builder =
        QueryBuilder::<Sqlite>::new("SELECT id, kind, order_id, reference, details, created_at FROM incidents");
    if let Some(kind) = kind {
        builder.push(" WHERE kind = ");
        builder.push_bind(kind);
    }
    builder.push(" ORDER BY id ASC");
    let incidents = builder.build_query_as::<Incident>().fetch_all(conn).await?;
    Ok(incidents)
}
