use crate::metrics::Metrics;
use crate::page::{Article, Page};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::sync::{Arc, LazyLock};

static INVALID_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).expect("valid filename regex"));

/// Replace characters that are not allowed in file names with `_`
pub fn sanitize_filename(title: &str) -> String {
    let cleaned = INVALID_FILENAME_CHARS.replace_all(title.trim(), "_");
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.into_owned()
    }
}

/// Render an article as a Markdown document headed by its title
pub fn render_markdown(article: &Article) -> Result<String> {
    let options = htmd::options::Options {
        heading_style: htmd::options::HeadingStyle::Atx,
        code_block_style: htmd::options::CodeBlockStyle::Fenced,
        link_style: htmd::options::LinkStyle::Inlined,
        ..Default::default()
    };
    let converter = htmd::HtmlToMarkdown::builder().options(options).build();
    let body = converter
        .convert(&article.content_html)
        .context("Failed to convert article HTML to Markdown")?;

    Ok(format!("# {}\n\n{}", article.title, body))
}

/// One-shot export of the displayed topic to a Markdown file
pub struct MarkdownExporter {
    dir: Utf8PathBuf,
    metrics: Arc<Metrics>,
}

impl MarkdownExporter {
    pub fn new(dir: impl Into<Utf8PathBuf>, metrics: Arc<Metrics>) -> Self {
        Self {
            dir: dir.into(),
            metrics,
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Write the current article to `{title}.md`.
    ///
    /// Returns `Ok(None)` when the page has no article to export.
    pub async fn export(&self, page: &dyn Page) -> Result<Option<Utf8PathBuf>> {
        let article = match page.article().await {
            Ok(Some(article)) => article,
            Ok(None) => {
                tracing::warn!("No article title or content on this page, nothing exported");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!("Could not read article from page: {}", e);
                return Ok(None);
            }
        };

        let markdown = render_markdown(&article)?;

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create export directory: {}", self.dir))?;

        let path = self
            .dir
            .join(format!("{}.md", sanitize_filename(&article.title)));
        std::fs::write(&path, markdown)
            .with_context(|| format!("Failed to write export: {}", path))?;

        self.metrics.record_export();
        tracing::info!("Exported '{}' to {}", article.title, path);
        Ok(Some(path))
    }
}
