use serde::{Deserialize, Serialize};

/// Direction of a money movement. Categories use the same INCOME/EXPENSE
/// vocabulary, so this doubles as the category kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "INCOME")]
    Income,
    #[serde(rename = "EXPENSE")]
    Expense,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Income => "INCOME",
            TransactionType::Expense => "EXPENSE",
        }
    }
}

#[derive(Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// Account row with its balance derived from the transactions table.
#[derive(Serialize)]
pub struct AccountSummary {
    pub id: i64,
    pub name: String,
    pub bank_name: Option<String>,
    pub current_balance: i64,
}

#[derive(Serialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub account_id: i64,
    pub description: String,
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub date: String,
    pub created_at: String,
    pub account_name: String,
}

#[derive(Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: i64,
}

#[derive(Serialize)]
pub struct MonthlyTotal {
    pub month: String,
    pub income: i64,
    pub expense: i64,
}
