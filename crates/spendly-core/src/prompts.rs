//! Prompt library for the model-backed oracles
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/spendly/prompts/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Each prompt file starts with TOML frontmatter between `+++` lines,
//! followed by a `# User` section using `{{var}}` placeholders.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const EXTRACT_EXPENSE: &str = include_str!("../../../prompts/extract_expense.md");
    pub const CATEGORIZE_EXPENSE: &str = include_str!("../../../prompts/categorize_expense.md");
    pub const PARSE_EXPENSE_QUERY: &str = include_str!("../../../prompts/parse_expense_query.md");
    pub const PARSE_BUDGET_COMMAND: &str =
        include_str!("../../../prompts/parse_budget_command.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    ExtractExpense,
    CategorizeExpense,
    ParseExpenseQuery,
    ParseBudgetCommand,
}

impl PromptId {
    /// Get the string identifier for this prompt
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractExpense => "extract_expense",
            Self::CategorizeExpense => "categorize_expense",
            Self::ParseExpenseQuery => "parse_expense_query",
            Self::ParseBudgetCommand => "parse_budget_command",
        }
    }

    /// Get all known prompt IDs
    pub fn all() -> &'static [PromptId] {
        &[
            Self::ExtractExpense,
            Self::CategorizeExpense,
            Self::ParseExpenseQuery,
            Self::ParseBudgetCommand,
        ]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::ExtractExpense => defaults::EXTRACT_EXPENSE,
            Self::CategorizeExpense => defaults::CATEGORIZE_EXPENSE,
            Self::ParseExpenseQuery => defaults::PARSE_EXPENSE_QUERY,
            Self::ParseBudgetCommand => defaults::PARSE_BUDGET_COMMAND,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    pub version: u32,
    pub task_type: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    pub content: String,
    pub is_override: bool,
}

impl Prompt {
    /// Render the user section with `{{var}}` placeholders replaced
    pub fn render_user(&self, vars: &HashMap<&str, &str>) -> String {
        let mut result = match self.content.find("# User") {
            Some(start) => self.content[start + "# User".len()..].trim().to_string(),
            None => self.content.clone(),
        };
        for (key, value) in vars {
            let pattern = format!("{{{{{}}}}}", key);
            result = result.replace(&pattern, value);
        }
        result
    }
}

/// Prompt library for loading and caching prompts
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Create a new prompt library with default paths
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with no override directory (embedded only)
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("prompt {}", id.as_str())))
    }

    /// Render a prompt's user section in one step
    pub fn render(&mut self, id: PromptId, vars: &HashMap<&str, &str>) -> Result<String> {
        Ok(self.get(id)?.render_user(vars))
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(ref override_dir) = self.override_dir {
            let override_path = override_dir.join(format!("{}.md", id.as_str()));
            if override_path.exists() {
                let content = fs::read_to_string(&override_path)?;
                let (metadata, body) = parse_prompt(&content)?;
                return Ok(Prompt {
                    metadata,
                    content: body,
                    is_override: true,
                });
            }
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            is_override: false,
        })
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendly").join("prompts"))
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    let rest = content.strip_prefix("+++").ok_or_else(|| {
        Error::InvalidData("Prompt must start with TOML frontmatter (+++)".into())
    })?;
    let end = rest.find("+++").ok_or_else(|| {
        Error::InvalidData("Prompt frontmatter not closed (missing second +++)".into())
    })?;

    let metadata: PromptMetadata = toml::from_str(rest[..end].trim())?;
    let body = rest[end + 3..].trim();

    Ok((metadata, body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt() {
        let content = "+++\nid = \"test\"\nversion = 2\ntask_type = \"reasoning\"\n+++\n\n# User\n\nHello {{name}}";
        let (metadata, body) = parse_prompt(content).unwrap();
        assert_eq!(metadata.id, "test");
        assert_eq!(metadata.version, 2);
        assert!(body.starts_with("# User"));
    }

    #[test]
    fn test_parse_prompt_requires_frontmatter() {
        assert!(parse_prompt("# User\nhi").is_err());
    }

    #[test]
    fn test_embedded_prompts_load_and_render() {
        let mut library = PromptLibrary::embedded_only();
        for id in PromptId::all() {
            let prompt = library.get(*id).unwrap();
            assert_eq!(prompt.metadata.id, id.as_str());
            assert!(!prompt.is_override);
        }

        let mut vars = HashMap::new();
        vars.insert("text", "50rs coffee at ccd");
        let rendered = library.render(PromptId::ExtractExpense, &vars).unwrap();
        assert!(rendered.contains("50rs coffee at ccd"));
        assert!(!rendered.contains("{{text}}"));
    }
}
