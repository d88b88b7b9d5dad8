//! Prompt templates for the drafting stage
//!
//! Templates live in per-platform TOML files under a configured directory;
//! a compiled-in default covers platforms without a file. The user template
//! substitutes `{transcript}` and `{title}` placeholders.

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Deserialize;

use clipflow_utils::Platform;

/// A prompt template: system instructions plus a user content template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// Identifier recorded on drafts for audit.
    pub id: String,
    /// System instructions sent with every request.
    pub system: String,
    /// User content template with `{transcript}` / `{title}` placeholders.
    pub user_template: String,
}

#[derive(Deserialize)]
struct TemplateFile {
    #[serde(default)]
    id: Option<String>,
    system_prompt: String,
    user_template: String,
}

impl PromptTemplate {
    /// Compiled-in template for a platform.
    #[must_use]
    pub fn default_for(platform: Platform) -> Self {
        match platform {
            Platform::Threads => Self {
                id: "threads-v1".to_string(),
                system: "You write concise social posts for Threads from video \
                         transcripts. Stay under 500 characters, keep the tone \
                         conversational, use at most three hashtags and avoid \
                         clickbait phrasing."
                    .to_string(),
                user_template: "Video title: {title}\n\nTranscript:\n{transcript}\n\n\
                                Write one Threads post summarizing the key idea."
                    .to_string(),
            },
        }
    }

    /// Load the platform's template from `<dir>/<platform>.toml`, falling
    /// back to the compiled-in default when the file does not exist.
    ///
    /// # Errors
    /// Fails when the file exists but cannot be read or parsed.
    pub fn load(dir: Option<&Utf8Path>, platform: Platform) -> Result<Self> {
        let Some(dir) = dir else {
            return Ok(Self::default_for(platform));
        };

        let path = dir.join(format!("{}.toml", platform.as_str()));
        if !path.exists() {
            return Ok(Self::default_for(platform));
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt template: {path}"))?;
        let file: TemplateFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse prompt template: {path}"))?;

        Ok(Self {
            id: file
                .id
                .unwrap_or_else(|| format!("{}-file", platform.as_str())),
            system: file.system_prompt,
            user_template: file.user_template,
        })
    }

    /// Substitute placeholders into the user template.
    #[must_use]
    pub fn render(&self, transcript: &str, title: &str) -> String {
        self.user_template
            .replace("{transcript}", transcript)
            .replace("{title}", title)
    }
}
