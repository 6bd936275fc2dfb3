use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use tracing::{debug, info};

use super::views::{floor_view_name, ViewPlan};
use super::{Table, TableSink, Value};
use crate::constants::{STOREY_RANGE, TOWN};
use crate::error::Result;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(r) => ToSqlOutput::from(*r),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQLite-backed table store
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened SQLite store at {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn distinct_text(&self, table: &str, column: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL",
            col = quote_ident(column),
            table = quote_ident(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut values = Vec::new();
        for value in rows {
            values.push(value?);
        }
        Ok(values)
    }
}

impl TableSink for SqliteSink {
    fn write_table(&mut self, name: &str, table: &Table) -> Result<usize> {
        let ident = quote_ident(name);
        let schema = table
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.kind.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=table.columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let columns = table
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {ident}; CREATE TABLE {ident} ({schema});"
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {ident} ({columns}) VALUES ({placeholders})"
            ))?;
            for row in &table.rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;

        debug!("Wrote {} rows to {}", table.len(), name);
        Ok(table.len())
    }

    fn create_views(&mut self, cleaned_table: &str) -> Result<Vec<String>> {
        let towns = self.distinct_text(cleaned_table, TOWN)?;
        let storeys = self.distinct_text(cleaned_table, STOREY_RANGE)?;
        let plan = ViewPlan::new(
            cleaned_table,
            towns.iter().map(String::as_str),
            storeys.iter().map(String::as_str),
        );

        let cleaned = quote_ident(cleaned_table);
        let helper = quote_ident(&plan.helper);
        let storey = quote_ident(STOREY_RANGE);
        let split = format!("instr({storey}, ' TO ')");

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP VIEW IF EXISTS {helper};
             CREATE VIEW {helper} AS
             SELECT *,
                 CASE WHEN {split} > 0
                      THEN CAST(substr({storey}, 1, {split} - 1) AS INTEGER) END AS storey_min,
                 CASE WHEN {split} > 0
                      THEN CAST(substr({storey}, {split} + 4) AS INTEGER) END AS storey_max
             FROM {cleaned};"
        ))?;

        for (view, town) in &plan.towns {
            let view = quote_ident(view);
            tx.execute_batch(&format!(
                "DROP VIEW IF EXISTS {view};
                 CREATE VIEW {view} AS SELECT * FROM {cleaned} WHERE {town_col} = {literal};",
                town_col = quote_ident(TOWN),
                literal = quote_literal(town)
            ))?;
        }

        for &floor in &plan.floors {
            let view = quote_ident(&floor_view_name(floor));
            tx.execute_batch(&format!(
                "DROP VIEW IF EXISTS {view};
                 CREATE VIEW {view} AS SELECT * FROM {helper}
                 WHERE {floor} BETWEEN storey_min AND storey_max;"
            ))?;
        }
        tx.commit()?;

        let names = plan.view_names();
        info!(
            "Created {} views on {} ({} towns, {} floors)",
            names.len(),
            cleaned_table,
            plan.towns.len(),
            plan.floors.len()
        );
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::record;
    use crate::types::Batch;

    fn count(sink: &SqliteSink, relation: &str) -> i64 {
        sink.connection()
            .query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(relation)), [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    fn cleaned_batch() -> Batch {
        let mut low = record("BEDOK", "4 ROOM", 400000.0, 90.0);
        low.storey_range = "01 TO 03".to_string();
        let mut mid = record("KALLANG/WHAMPOA", "4 ROOM", 500000.0, 90.0);
        mid.storey_range = "04 TO 06".to_string();
        let mut tall = record("BEDOK", "5 ROOM", 600000.0, 110.0);
        tall.storey_range = "03 TO 05".to_string();
        Batch::new("cleaned", vec![low, mid, tall])
    }

    #[test]
    fn test_write_table_replaces_contents() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let table = Table::from_batch(&cleaned_batch());

        assert_eq!(sink.write_table("Cleaned", &table).unwrap(), 3);
        assert_eq!(count(&sink, "Cleaned"), 3);

        let smaller = Table::from_batch(&Batch::new("cleaned", cleaned_batch().records[..1].to_vec()));
        sink.write_table("Cleaned", &smaller).unwrap();
        assert_eq!(count(&sink, "Cleaned"), 1);
    }

    #[test]
    fn test_sentinels_round_trip() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let mut r = record("BEDOK", "4 ROOM", 400000.0, 90.0);
        r.resale_price = None;
        let raw = Table::from_raw(&Batch::new("raw", vec![r]));
        sink.write_table("Raw", &raw).unwrap();

        let (price, lease): (f64, String) = sink
            .connection()
            .query_row("SELECT resale_price, remaining_lease FROM Raw", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(price, -1.0);
        assert_eq!(lease, "-1");
    }

    #[test]
    fn test_views_over_cleaned_table() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        sink.write_table("Cleaned", &Table::from_batch(&cleaned_batch()))
            .unwrap();

        let views = sink.create_views("Cleaned").unwrap();
        assert!(views.contains(&"Cleaned_with_storeys".to_string()));
        assert!(views.contains(&"town_KALLANG_WHAMPOA".to_string()));

        assert_eq!(count(&sink, "town_BEDOK"), 2);
        assert_eq!(count(&sink, "town_KALLANG_WHAMPOA"), 1);
        // floor 3 sits in "01 TO 03" and "03 TO 05"
        assert_eq!(count(&sink, "Floor_03"), 2);
        assert_eq!(count(&sink, "Floor_01"), 1);
        assert_eq!(count(&sink, "Floor_04"), 2);
        assert_eq!(count(&sink, "Floor_05"), 2);

        let (lo, hi): (i64, i64) = sink
            .connection()
            .query_row(
                "SELECT storey_min, storey_max FROM Cleaned_with_storeys WHERE storey_range = '04 TO 06'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((lo, hi), (4, 6));
    }

    #[test]
    fn test_colliding_town_names_keep_separate_views() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let batch = Batch::new(
            "cleaned",
            vec![
                record("KALLANG/WHAMPOA", "4 ROOM", 500000.0, 90.0),
                record("KALLANG WHAMPOA", "4 ROOM", 510000.0, 90.0),
            ],
        );
        sink.write_table("Cleaned", &Table::from_batch(&batch)).unwrap();

        let views = sink.create_views("Cleaned").unwrap();
        let towns: Vec<&String> = views.iter().filter(|v| v.starts_with("town_")).collect();
        assert_eq!(towns, vec!["town_KALLANG_WHAMPOA", "town_KALLANG_WHAMPOA_2"]);
        assert_eq!(count(&sink, "town_KALLANG_WHAMPOA"), 1);
        assert_eq!(count(&sink, "town_KALLANG_WHAMPOA_2"), 1);

        let town: String = sink
            .connection()
            .query_row("SELECT town FROM town_KALLANG_WHAMPOA_2", [], |row| row.get(0))
            .unwrap();
        assert_eq!(town, "KALLANG/WHAMPOA");
    }

    #[test]
    fn test_views_can_be_recreated() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        sink.write_table("Cleaned", &Table::from_batch(&cleaned_batch()))
            .unwrap();
        let first = sink.create_views("Cleaned").unwrap();
        let second = sink.create_views("Cleaned").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("etl.db");
        let mut sink = SqliteSink::open(&path).unwrap();
        sink.write_table("Cleaned", &Table::from_batch(&cleaned_batch()))
            .unwrap();
        assert!(path.exists());
    }
}
