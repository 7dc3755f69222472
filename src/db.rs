use std::path::Path;

use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Result, params};

use crate::models::{
    AccountSummary, Category, CategoryTotal, MonthlyTotal, TransactionRecord, User,
};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Categories every freshly registered user starts with.
pub const DEFAULT_CATEGORIES: [(&str, &str); 9] = [
    ("Alimentação", "EXPENSE"),
    ("Moradia", "EXPENSE"),
    ("Transporte", "EXPENSE"),
    ("Lazer", "EXPENSE"),
    ("Saúde", "EXPENSE"),
    ("Mercado", "EXPENSE"),
    ("Salário", "INCOME"),
    ("Investimento", "INCOME"),
    ("Outros", "EXPENSE"),
];

pub fn init_db(path: &Path) -> DbPool {
    let manager = SqliteConnectionManager::file(path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::new(manager).expect("db pool");
    {
        let conn = pool.get().expect("db connection");
        run_migrations(&conn).expect("db migrations");
    }
    pool
}

/// Pool over a uniquely named shared-cache in-memory database, so every
/// test gets its own isolated store.
#[cfg(test)]
pub fn init_test_db() -> DbPool {
    let url = format!(
        "file:memdb_{}?mode=memory&cache=shared",
        uuid::Uuid::new_v4().simple()
    );
    let manager = SqliteConnectionManager::file(&url)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::new(manager).expect("test db pool");
    {
        let conn = pool.get().expect("test db connection");
        run_migrations(&conn).expect("test db migrations");
    }
    pool
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            bank_name TEXT,
            initial_balance INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            type TEXT NOT NULL CHECK(type IN ('INCOME', 'EXPENSE'))
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            description TEXT NOT NULL,
            amount INTEGER NOT NULL,
            type TEXT NOT NULL CHECK(type IN ('INCOME', 'EXPENSE')),
            category TEXT NOT NULL DEFAULT 'Outros',
            date TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
        ",
    )
}

// --- users & sessions ---

pub fn insert_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    created_at: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
        params![username, password_hash, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn user_by_id(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    conn.query_row(
        "SELECT id, username FROM users WHERE id = ?1",
        params![user_id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
            })
        },
    )
    .optional()
}

pub fn user_credentials(conn: &Connection, username: &str) -> Result<Option<(i64, String)>> {
    conn.query_row(
        "SELECT id, password_hash FROM users WHERE username = ?1",
        params![username],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

/// Update the caller's profile; the hash only changes when a new one is
/// supplied.
pub fn update_user(
    conn: &Connection,
    user_id: i64,
    username: &str,
    password_hash: Option<&str>,
) -> Result<()> {
    match password_hash {
        Some(hash) => conn.execute(
            "UPDATE users SET username = ?1, password_hash = ?2 WHERE id = ?3",
            params![username, hash, user_id],
        )?,
        None => conn.execute(
            "UPDATE users SET username = ?1 WHERE id = ?2",
            params![username, user_id],
        )?,
    };
    Ok(())
}

pub fn delete_user(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
    Ok(())
}

pub fn create_session(
    conn: &Connection,
    user_id: i64,
    token: &str,
    created_at: &str,
    expires_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (user_id, token, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, token, created_at, expires_at],
    )?;
    Ok(())
}

/// Owner of a token plus its expiry horizon; the guard decides validity.
pub fn session_user(conn: &Connection, token: &str) -> Result<Option<(User, String)>> {
    conn.query_row(
        "
        SELECT u.id, u.username, s.expires_at
        FROM sessions s
        JOIN users u ON s.user_id = u.id
        WHERE s.token = ?1
        ",
        params![token],
        |row| {
            Ok((
                User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                },
                row.get(2)?,
            ))
        },
    )
    .optional()
}

pub fn delete_expired_sessions(conn: &Connection, user_id: i64, now: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM sessions WHERE user_id = ?1 AND expires_at <= ?2",
        params![user_id, now],
    )?;
    Ok(())
}

// --- categories ---

pub fn seed_default_categories(conn: &Connection, user_id: i64) -> Result<()> {
    for (name, kind) in DEFAULT_CATEGORIES {
        insert_category(conn, user_id, name, kind)?;
    }
    Ok(())
}

pub fn list_categories(conn: &Connection, user_id: i64) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, name, type
        FROM categories
        WHERE user_id = ?1
        ORDER BY name
        ",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_category(conn: &Connection, user_id: i64, name: &str, kind: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO categories (user_id, name, type) VALUES (?1, ?2, ?3)",
        params![user_id, name, kind],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Scoped delete. Transactions keep their category label as free text.
pub fn delete_category(conn: &Connection, user_id: i64, category_id: i64) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM categories WHERE id = ?1 AND user_id = ?2",
        params![category_id, user_id],
    )?;
    Ok(affected > 0)
}

// --- accounts & balances ---

pub fn insert_account(
    conn: &Connection,
    user_id: i64,
    name: &str,
    bank_name: Option<&str>,
    initial_balance: i64,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO accounts (user_id, name, bank_name, initial_balance) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, name, bank_name, initial_balance],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Accounts with their current balance derived on the fly:
/// initial balance plus signed transaction sums. Recomputed on every read.
pub fn list_accounts(conn: &Connection, user_id: i64) -> Result<Vec<AccountSummary>> {
    let mut stmt = conn.prepare(
        "
        SELECT a.id, a.name, a.bank_name,
               a.initial_balance
             + COALESCE(SUM(CASE WHEN t.type = 'INCOME' THEN t.amount ELSE 0 END), 0)
             - COALESCE(SUM(CASE WHEN t.type = 'EXPENSE' THEN t.amount ELSE 0 END), 0)
               AS current_balance
        FROM accounts a
        LEFT JOIN transactions t ON a.id = t.account_id
        WHERE a.user_id = ?1
        GROUP BY a.id
        ORDER BY a.id
        ",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(AccountSummary {
            id: row.get(0)?,
            name: row.get(1)?,
            bank_name: row.get(2)?,
            current_balance: row.get(3)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn account_belongs_to(conn: &Connection, account_id: i64, user_id: i64) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?1 AND user_id = ?2)",
        params![account_id, user_id],
        |row| row.get::<_, i64>(0),
    )
    .map(|value| value == 1)
}

/// Sum of every account's current balance; 0 when the user owns none.
pub fn global_balance(conn: &Connection, user_id: i64) -> Result<i64> {
    conn.query_row(
        "
        SELECT COALESCE(SUM(current_balance), 0) FROM (
            SELECT a.initial_balance
                 + COALESCE(SUM(CASE WHEN t.type = 'INCOME' THEN t.amount ELSE 0 END), 0)
                 - COALESCE(SUM(CASE WHEN t.type = 'EXPENSE' THEN t.amount ELSE 0 END), 0)
                   AS current_balance
            FROM accounts a
            LEFT JOIN transactions t ON a.id = t.account_id
            WHERE a.user_id = ?1
            GROUP BY a.id
        )
        ",
        params![user_id],
        |row| row.get(0),
    )
}

// --- transactions ---

pub fn insert_transaction(
    conn: &Connection,
    account_id: i64,
    description: &str,
    amount: i64,
    kind: &str,
    category: &str,
    date: NaiveDate,
) -> Result<i64> {
    conn.execute(
        "
        INSERT INTO transactions (account_id, description, amount, type, category, date)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ",
        params![account_id, description, amount, kind, category, date],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Caller-scoped listing with optional month (`YYYY-MM`) and exact category
/// filters. Newest first; same-day rows tie-break on id, which grows with
/// insertion order.
pub fn list_transactions(
    conn: &Connection,
    user_id: i64,
    month: Option<&str>,
    category: Option<&str>,
) -> Result<Vec<TransactionRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT t.id, t.account_id, t.description, t.amount, t.type,
               t.category, t.date, t.created_at, a.name AS account_name
        FROM transactions t
        JOIN accounts a ON t.account_id = a.id
        WHERE a.user_id = ?1
          AND (?2 IS NULL OR t.date LIKE ?2 || '-%')
          AND (?3 IS NULL OR t.category = ?3)
        ORDER BY t.date DESC, t.id DESC
        ",
    )?;
    let rows = stmt.query_map(params![user_id, month, category], |row| {
        Ok(TransactionRecord {
            id: row.get(0)?,
            account_id: row.get(1)?,
            description: row.get(2)?,
            amount: row.get(3)?,
            kind: row.get(4)?,
            category: row.get(5)?,
            date: row.get(6)?,
            created_at: row.get(7)?,
            account_name: row.get(8)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// --- reports ---

/// All-time expense totals per category label. Labels with no expense rows
/// simply never appear.
pub fn category_report(conn: &Connection, user_id: i64) -> Result<Vec<CategoryTotal>> {
    let mut stmt = conn.prepare(
        "
        SELECT t.category, SUM(t.amount) AS total
        FROM transactions t
        JOIN accounts a ON t.account_id = a.id
        WHERE a.user_id = ?1 AND t.type = 'EXPENSE'
        GROUP BY t.category
        ORDER BY total DESC
        ",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(CategoryTotal {
            category: row.get(0)?,
            total: row.get(1)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Income and expense sums per calendar month, restricted to the most
/// recent 12 months that have transactions, oldest of those first.
pub fn monthly_report(conn: &Connection, user_id: i64) -> Result<Vec<MonthlyTotal>> {
    let mut stmt = conn.prepare(
        "
        SELECT month, income, expense FROM (
            SELECT substr(t.date, 1, 7) AS month,
                   COALESCE(SUM(CASE WHEN t.type = 'INCOME' THEN t.amount END), 0) AS income,
                   COALESCE(SUM(CASE WHEN t.type = 'EXPENSE' THEN t.amount END), 0) AS expense
            FROM transactions t
            JOIN accounts a ON t.account_id = a.id
            WHERE a.user_id = ?1
            GROUP BY month
            ORDER BY month DESC
            LIMIT 12
        )
        ORDER BY month ASC
        ",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(MonthlyTotal {
            month: row.get(0)?,
            income: row.get(1)?,
            expense: row.get(2)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
