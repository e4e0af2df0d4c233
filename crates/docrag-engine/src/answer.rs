//! Question answering on top of retrieval: prompt templates per question
//! kind, source attribution, confidence, and a summary of the stored
//! documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use docrag_core::error::{Error, Result};
use docrag_core::traits::AnswerGenerator;
use docrag_core::types::{Context, DocumentInfo};

use crate::engine::RetrievalEngine;

pub const NO_DOCUMENTS_ANSWER: &str =
    "I could not find relevant documents to answer your question. Make sure documents have been ingested.";

const MAX_SUMMARY_AREAS: usize = 10;
const RECENT_DOCUMENTS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    #[default]
    General,
    Numbers,
    Areas,
    Owner,
}

impl QuestionKind {
    pub const ALL: [QuestionKind; 4] = [Self::General, Self::Numbers, Self::Areas, Self::Owner];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Numbers => "numbers",
            Self::Areas => "areas",
            Self::Owner => "owner",
        }
    }

    fn instructions(self) -> &'static str {
        match self {
            Self::General => {
                "You are an assistant specialized in property registration documents.\n\
                 Use the provided context to answer the question precisely.\n\n\
                 INSTRUCTIONS:\n\
                 - Answer ONLY from the context\n\
                 - If the information is not in the context, say \"I did not find this information in the documents\"\n\
                 - Cite the documents when relevant\n\
                 - Quote numbers and specific data exactly as they appear"
            }
            Self::Numbers => {
                "You extract numbers and specific data from property registration documents.\n\n\
                 INSTRUCTIONS:\n\
                 - Extract ONLY numbers and data present in the context\n\
                 - If the requested number is not there, say \"Number not found\"\n\
                 - Cite the source document when possible\n\
                 - Be exact with values"
            }
            Self::Areas => {
                "You are an expert on property areas. Use the context to answer about specific areas.\n\n\
                 INSTRUCTIONS:\n\
                 - Focus on area information (private, common, total)\n\
                 - Mention units of measure (m², ha)\n\
                 - If there is no area information, say \"Area information not found\"\n\
                 - Cite the document when relevant"
            }
            Self::Owner => {
                "You answer questions about property owners.\n\n\
                 INSTRUCTIONS:\n\
                 - Extract owner names, tax ids and addresses\n\
                 - If there is no owner information, say \"Owner information not found\"\n\
                 - Be careful with personal data\n\
                 - Cite the source document"
            }
        }
    }

    /// Full prompt for `question` over `context`.
    pub fn prompt(self, context: &str, question: &str) -> String {
        format!("{}\n\nCONTEXT:\n{context}\n\nQUESTION: {question}\n\nANSWER:", self.instructions())
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidConfig(format!("unknown question kind '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub filename: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    /// Empty when no relevant document was found.
    pub context: String,
    pub sources: Vec<Source>,
    pub confidence: f32,
    pub kind: QuestionKind,
}

/// Retrieve context for `question` and let `generator` answer it.
///
/// Without relevant documents the generator is not called and the answer
/// carries zero confidence.
pub async fn ask(
    engine: &RetrievalEngine,
    generator: &dyn AnswerGenerator,
    question: &str,
    kind: QuestionKind,
    max_context: usize,
) -> Result<Answer> {
    let results = engine.search(question, engine.context_top_k()).await?;
    let context = match crate::context::assemble_context(&results, max_context) {
        Context::Found(text) if !text.trim().is_empty() => text,
        _ => {
            return Ok(Answer {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                context: String::new(),
                sources: Vec::new(),
                confidence: 0.0,
                kind,
            })
        }
    };

    let prompt = kind.prompt(&context, question);
    let answer = generator
        .generate(&prompt)
        .map_err(|e| Error::Operation(format!("answer generation failed: {e:#}")))?;

    let scores: Vec<f32> = results.iter().map(|r| r.score).collect();
    Ok(Answer {
        answer: answer.trim().to_string(),
        context,
        sources: results.iter().map(|r| Source { filename: r.filename.clone(), score: r.score }).collect(),
        confidence: engine.confidence_policy().score(&scores),
        kind,
    })
}

/// Starter questions for an empty chat.
pub fn suggested_questions() -> &'static [&'static str] {
    &[
        "What is the registration number?",
        "Who owns the property?",
        "What is the private area of the property?",
        "What is the total area of the property?",
        "What is the property tax id?",
        "Does the property have a parking space?",
        "What is the common-use area?",
        "What is the property address?",
        "Are there any restrictions on the property?",
        "What is the property value?",
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub total_documents: usize,
    pub registration_numbers: Vec<String>,
    pub areas: Vec<String>,
    pub recent_documents: Vec<DocumentInfo>,
}

/// Overview built from each document's `extracted_info`: distinct
/// `registration_number` values, up to ten `areas` entries, and the five most
/// recent documents.
pub async fn document_summary(engine: &RetrievalEngine) -> Result<DocumentSummary> {
    let documents = engine.get_all_documents().await?;

    let mut registration_numbers = BTreeSet::new();
    let mut areas = Vec::new();
    for doc in &documents {
        if let Some(number) = doc.extracted_info.get("registration_number").and_then(value_text) {
            registration_numbers.insert(number);
        }
        if let Some(map) = doc.extracted_info.get("areas").and_then(serde_json::Value::as_object) {
            for (kind, value) in map {
                if let Some(text) = value_text(value) {
                    areas.push(format!("{kind}: {text}"));
                }
            }
        }
    }
    areas.truncate(MAX_SUMMARY_AREAS);

    Ok(DocumentSummary {
        total_documents: documents.len(),
        registration_numbers: registration_numbers.into_iter().collect(),
        areas,
        recent_documents: documents.into_iter().take(RECENT_DOCUMENTS).collect(),
    })
}

fn value_text(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::Null => return None,
        serde_json::Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}
