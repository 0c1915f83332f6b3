//! Database migrations
//!
//! SQL migrations are embedded as strings and executed when a database is opened.

use rusqlite::Connection;

use crate::error::Result;

/// Memory tables SQL (001)
pub const MEMORY_TABLES_SQL: &str = include_str!("001_memory_tables.sql");

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(MEMORY_TABLES_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table'
                   AND name IN ('memory_record', 'memory_edge', 'memory_vector', 'memory_digest')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }
}
