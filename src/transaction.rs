//! Transaction controller.

use crate::connection::Connection;
use crate::defs::CompletionType;
use crate::error::Error;

/// A live transaction on a [`Connection`].
///
/// Committing or rolling back issues the driver's end-transaction call and
/// restores autocommit and the read-write access mode; the restoration is
/// best-effort and never fails the transaction operation. Dropping an
/// unfinished transaction rolls it back.
#[must_use = "a transaction is rolled back when dropped without commit"]
pub struct Transaction<'c> {
    conn: &'c Connection,
    finished: bool,
}

impl<'c> Transaction<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Transaction {
            conn,
            finished: false,
        }
    }

    /// Commits the transaction. A no-op if it already ended.
    pub fn commit(mut self) -> Result<(), Error> {
        self.finished = true;
        self.conn.end_transaction(CompletionType::Commit)
    }

    /// Rolls the transaction back. A no-op if it already ended.
    pub fn rollback(mut self) -> Result<(), Error> {
        self.finished = true;
        self.conn.end_transaction(CompletionType::Rollback)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.conn.end_transaction(CompletionType::Rollback);
        }
    }
}
