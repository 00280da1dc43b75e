use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::{
    backend::{elapsed_ms, InferenceBackend},
    models::{AdapterKind, BackendResult, SamplingConfig},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedCategory {
    Greeting,
    Complaint,
    Contact,
    Services,
    Schemes,
    Documents,
    Default,
}

struct CannedEntry {
    category: CannedCategory,
    keywords: &'static [&'static str],
    reply: &'static str,
}

// Checked top to bottom; the first entry with a matching keyword wins.
const TABLE: &[CannedEntry] = &[
    CannedEntry {
        category: CannedCategory::Greeting,
        keywords: &["hello", "hi", "hey", "greetings"],
        reply: "Hello! Welcome to the MSPSDC chat assistant. How can I help you today?",
    },
    CannedEntry {
        category: CannedCategory::Complaint,
        keywords: &["complaint", "complaints", "grievance", "grievances", "problem", "issue"],
        reply: "Sorry to hear you ran into a problem. You can register a grievance through the \
MSPSDC portal and track its resolution with the reference number you receive.",
    },
    CannedEntry {
        category: CannedCategory::Contact,
        keywords: &["contact", "phone", "email", "helpline", "helpdesk", "office", "call"],
        reply: "You can reach the MSPSDC helpdesk through the contact page of the official \
website, or visit your nearest service center during working hours.",
    },
    CannedEntry {
        category: CannedCategory::Services,
        keywords: &["service", "services", "help", "assistance"],
        reply: "MSPSDC offers public services including document verification, certificate \
issuance and citizen support. Which service are you interested in?",
    },
    CannedEntry {
        category: CannedCategory::Schemes,
        keywords: &["scheme", "schemes", "welfare", "benefits", "program", "programme"],
        reply: "Meghalaya runs welfare schemes for healthcare, education and livelihood \
support. Would you like details about a specific scheme?",
    },
    CannedEntry {
        category: CannedCategory::Documents,
        keywords: &["document", "documents", "certificate", "certificates"],
        reply: "Birth, caste, income and domicile certificates can be applied for online \
through the portal, where you can also track the application status.",
    },
];

const DEFAULT_REPLY: &str = "I can help with questions about MSPSDC services, documents and \
welfare schemes. Could you share a few more details about what you need?";

/// Terminal adapter: keyword-matched static replies, no network, never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct CannedTextBackend;

impl CannedTextBackend {
    pub fn categorize(&self, prompt: &str) -> CannedCategory {
        let words = prompt
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .collect::<Vec<_>>();

        TABLE
            .iter()
            .find(|entry| {
                entry
                    .keywords
                    .iter()
                    .any(|keyword| words.iter().any(|word| word == keyword))
            })
            .map(|entry| entry.category)
            .unwrap_or(CannedCategory::Default)
    }

    pub fn reply(&self, prompt: &str) -> &'static str {
        let category = self.categorize(prompt);
        TABLE
            .iter()
            .find(|entry| entry.category == category)
            .map(|entry| entry.reply)
            .unwrap_or(DEFAULT_REPLY)
    }

    pub fn default_reply(&self) -> &'static str {
        DEFAULT_REPLY
    }

    pub fn respond(&self, prompt: &str) -> BackendResult {
        let started = Instant::now();
        let text = self.reply(prompt).to_owned();
        BackendResult::generated(text, elapsed_ms(started))
    }
}

#[async_trait]
impl InferenceBackend for CannedTextBackend {
    fn name(&self) -> &str {
        "canned-text"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::CannedText
    }

    async fn attempt(
        &self,
        prompt: &str,
        _sampling: &SamplingConfig,
        _timeout: Duration,
    ) -> BackendResult {
        self.respond(prompt)
    }

    async fn probe(&self, _timeout: Duration) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_keywords_to_categories() {
        let canned = CannedTextBackend;
        assert_eq!(canned.categorize("Hello there"), CannedCategory::Greeting);
        assert_eq!(canned.categorize("I want to file a complaint"), CannedCategory::Complaint);
        assert_eq!(canned.categorize("How do I contact you?"), CannedCategory::Contact);
        assert_eq!(canned.categorize("Which SERVICES exist?"), CannedCategory::Services);
        assert_eq!(canned.categorize("welfare benefits"), CannedCategory::Schemes);
        assert_eq!(canned.categorize("birth certificate"), CannedCategory::Documents);
    }

    #[test]
    fn matches_whole_words_only() {
        let canned = CannedTextBackend;
        assert_eq!(canned.categorize("What is AI?"), CannedCategory::Default);
        assert_eq!(canned.categorize("this thing"), CannedCategory::Default);
        assert_eq!(canned.reply("What is AI?"), canned.default_reply());
    }

    #[test]
    fn replies_are_deterministic_and_non_empty() {
        let canned = CannedTextBackend;
        for prompt in ["hi", "complaint", "contact", "service", "scheme", "document", "?"] {
            let first = canned.respond(prompt);
            assert!(first.succeeded());
            assert!(!first.text().unwrap_or_default().is_empty());
            assert_eq!(first.text(), canned.respond(prompt).text());
        }
    }
}
