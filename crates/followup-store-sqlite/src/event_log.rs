//! [`SqliteEventLog`], an [`EventSource`] over the `event_log` table.

use followup_core::source::{EventSource, RawRecord};
use rusqlite::OptionalExtension as _;
use tracing::debug;

use crate::{Result, encode::decode_dt};

/// Offset value meaning "nothing consumed yet".
const BEFORE_FIRST: i64 = -1;

/// One consumer group's cursor over one topic.
///
/// Polling advances an in-memory position; only [`EventSource::commit`]
/// persists it to `consumer_offset`.
pub struct SqliteEventLog {
  conn:      tokio_rusqlite::Connection,
  topic:     String,
  group:     String,
  position:  i64,
  committed: i64,
}

struct RawEvent {
  offset:       i64,
  key:          String,
  value:        Option<String>,
  published_at: String,
}

impl SqliteEventLog {
  pub(crate) async fn open(
    conn: tokio_rusqlite::Connection,
    topic: &str,
    group: &str,
  ) -> Result<Self> {
    let (topic_param, group_param) = (topic.to_owned(), group.to_owned());
    let committed = conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT committed_offset FROM consumer_offset
               WHERE consumer_group = ?1 AND topic = ?2",
              rusqlite::params![group_param, topic_param],
              |row| row.get::<_, i64>(0),
            )
            .optional()?,
        )
      })
      .await?
      .unwrap_or(BEFORE_FIRST);

    Ok(Self {
      conn,
      topic: topic.to_owned(),
      group: group.to_owned(),
      position: committed,
      committed,
    })
  }

  /// The last durably committed offset, if any.
  pub fn committed(&self) -> Option<i64> {
    (self.committed != BEFORE_FIRST).then_some(self.committed)
  }
}

impl EventSource for SqliteEventLog {
  type Error = crate::Error;

  fn topic(&self) -> &str { &self.topic }

  async fn poll(&mut self, max: usize) -> Result<Vec<RawRecord>> {
    let topic = self.topic.clone();
    let after = self.position;
    let limit = i64::try_from(max).unwrap_or(i64::MAX);

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT record_offset, record_key, value, published_at
           FROM event_log
           WHERE topic = ?1 AND record_offset > ?2
           ORDER BY record_offset
           LIMIT ?3",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![topic, after, limit], |row| {
            Ok(RawEvent {
              offset:       row.get(0)?,
              key:          row.get(1)?,
              value:        row.get(2)?,
              published_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let records = raws
      .into_iter()
      .map(|raw| {
        Ok(RawRecord {
          offset:       raw.offset,
          key:          raw.key,
          value:        raw.value,
          published_at: decode_dt(&raw.published_at)?,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    if let Some(last) = records.last() {
      self.position = last.offset;
    }
    Ok(records)
  }

  async fn commit(&mut self) -> Result<()> {
    if self.position == self.committed {
      return Ok(());
    }

    let (group, topic, position) = (self.group.clone(), self.topic.clone(), self.position);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO consumer_offset (consumer_group, topic, committed_offset)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (consumer_group, topic)
           DO UPDATE SET committed_offset = excluded.committed_offset",
          rusqlite::params![group, topic, position],
        )?;
        Ok(())
      })
      .await?;

    self.committed = position;
    Ok(())
  }

  async fn rewind(&mut self) -> Result<()> {
    debug!(
      topic = %self.topic,
      from = self.position,
      to = self.committed,
      "rewinding to last committed offset"
    );
    self.position = self.committed;
    Ok(())
  }
}
