//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on input patterns.

use async_trait::async_trait;

use crate::error::Result;
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Used for unit testing without making real API calls.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response).
    custom_responses: Vec<(String, String)>,
}

impl MockLlmClient {
    /// Creates a new mock client with default banking responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the input contains `pattern`, the mock will return `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Generates a mock response based on the input.
    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        // Check custom responses first
        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        if input_lower.contains("balance") {
            return "```sql\nSELECT AccountID, AccountType, Balance FROM Account WHERE CustomerID = :CustomerID;\n```".to_string();
        }

        if input_lower.contains("transaction") {
            return "```sql\nSELECT t.TransactionDate, t.TransactionType, t.Amount FROM BankTransaction t JOIN Account a ON t.AccountID = a.AccountID WHERE a.CustomerID = :CustomerID ORDER BY t.TransactionDate DESC;\n```".to_string();
        }

        if input_lower.contains("card") {
            return "```sql\nSELECT c.CardType, c.CardNumber, c.CardStatus FROM AccountCards c JOIN Account a ON c.AccountID = a.AccountID WHERE a.CustomerID = :CustomerID;\n```".to_string();
        }

        if input_lower.contains("loan") {
            return "```sql\nSELECT LoanType, LoanAmount, InterestRate FROM Loan WHERE CustomerID = :CustomerID;\n```".to_string();
        }

        // Questions a read-only assistant must refuse get a mutation back,
        // which the safety gate then rejects.
        if input_lower.contains("close my account") || input_lower.contains("delete") {
            return "```sql\nDELETE FROM Account WHERE CustomerID = :CustomerID;\n```".to_string();
        }

        "I could not understand that question. Could you rephrase it?".to_string()
    }

    /// Extracts the last user message content from a message list.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let input = Self::extract_user_input(messages);
        Ok(self.mock_response(&input))
    }
}
