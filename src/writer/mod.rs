//! Streaming result writer
//!
//! Append-only sink for scraped content records in JSONL, JSON-array or CSV
//! form. Records are buffered and flushed in batches; once flushed, bytes are
//! never rewritten, so readers always see whole records. Closing writes any
//! format footer plus a sibling `{jobId}-meta.json` describing the output.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::scrape::schema::ScrapedContent;

/// Output encodings supported by the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line
    Jsonl,
    /// A single JSON array
    Json,
    /// Fixed columns: url,title,depth,wordCount,language,scrapedAt
    Csv,
}

impl OutputFormat {
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jsonl" => Ok(Self::Jsonl),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => bail!("Unknown output format: {other}"),
        }
    }
}

/// Configuration for the streaming writer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    /// Buffered record count that triggers an automatic flush
    pub flush_every: usize,
    /// Hard buffer bound; reaching it forces an immediate flush
    pub max_buffer: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data/results"),
            format: OutputFormat::Jsonl,
            flush_every: 25,
            max_buffer: 200,
        }
    }
}

/// Metadata describing a finished output file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterMeta {
    pub job_id: String,
    pub output_path: PathBuf,
    pub format: OutputFormat,
    pub total_results: usize,
    pub completed_at: DateTime<Utc>,
}

struct WriterInner {
    file: tokio::fs::File,
    buffer: Vec<String>,
    total_results: usize,
    any_record_written: bool,
    closed: bool,
}

/// Buffered, append-only result sink
pub struct StreamingWriter {
    job_id: String,
    path: PathBuf,
    config: WriterConfig,
    inner: tokio::sync::Mutex<WriterInner>,
}

impl StreamingWriter {
    /// Open the output file `{outputDir}/{jobId}-results.{ext}`
    pub async fn create(job_id: &str, config: WriterConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .with_context(|| {
                format!("Failed to create output dir {}", config.output_dir.display())
            })?;

        let path = config
            .output_dir
            .join(format!("{job_id}-results.{}", config.format.extension()));
        let mut file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        // Format headers are written up front so partial output stays parseable
        match config.format {
            OutputFormat::Json => file.write_all(b"[").await?,
            OutputFormat::Csv => {
                file.write_all(b"\"url\",\"title\",\"depth\",\"wordCount\",\"language\",\"scrapedAt\"\n")
                    .await?;
            }
            OutputFormat::Jsonl => {}
        }
        file.flush().await?;

        info!("Streaming results to {}", path.display());
        Ok(Self {
            job_id: job_id.to_string(),
            path,
            config,
            inner: tokio::sync::Mutex::new(WriterInner {
                file,
                buffer: Vec::new(),
                total_results: 0,
                any_record_written: false,
                closed: false,
            }),
        })
    }

    /// Path of the output file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer one record, flushing when a threshold is reached
    pub async fn write(&self, record: &ScrapedContent) -> Result<()> {
        let rendered = self.render(record)?;

        let mut inner = self.inner.lock().await;
        if inner.closed {
            bail!("Writer already closed");
        }
        inner.buffer.push(rendered);
        inner.total_results += 1;

        if inner.buffer.len() >= self.config.max_buffer {
            debug!("Writer buffer at hard bound, forcing flush");
            Self::flush_inner(&mut inner, self.config.format).await?;
        } else if inner.buffer.len() >= self.config.flush_every {
            Self::flush_inner(&mut inner, self.config.format).await?;
        }
        Ok(())
    }

    /// Flush any buffered records to disk
    pub async fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Ok(());
        }
        Self::flush_inner(&mut inner, self.config.format).await
    }

    /// Flush, write the format footer, close the stream and write the
    /// sibling `{jobId}-meta.json`
    pub async fn close(&self) -> Result<WriterMeta> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            bail!("Writer already closed");
        }
        Self::flush_inner(&mut inner, self.config.format).await?;

        if self.config.format == OutputFormat::Json {
            inner.file.write_all(b"\n]\n").await?;
        }
        inner.file.flush().await?;
        inner.closed = true;

        let meta = WriterMeta {
            job_id: self.job_id.clone(),
            output_path: self.path.clone(),
            format: self.config.format,
            total_results: inner.total_results,
            completed_at: Utc::now(),
        };
        drop(inner);

        let meta_path = self
            .config
            .output_dir
            .join(format!("{}-meta.json", self.job_id));
        tokio::fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)
            .await
            .with_context(|| format!("Failed to write {}", meta_path.display()))?;

        info!(
            "Closed result stream: {} records in {}",
            meta.total_results,
            self.path.display()
        );
        Ok(meta)
    }

    /// Total records accepted so far
    pub async fn total_results(&self) -> usize {
        self.inner.lock().await.total_results
    }

    fn render(&self, record: &ScrapedContent) -> Result<String> {
        Ok(match self.config.format {
            OutputFormat::Jsonl | OutputFormat::Json => serde_json::to_string(record)?,
            OutputFormat::Csv => {
                let fields = [
                    record.url.clone(),
                    record.title.clone(),
                    record.metadata.depth.to_string(),
                    record.metadata.word_count.to_string(),
                    record.metadata.language.clone(),
                    record.metadata.scraped_at.to_rfc3339(),
                ];
                fields
                    .iter()
                    .map(|f| csv_quote(f))
                    .collect::<Vec<_>>()
                    .join(",")
            }
        })
    }

    async fn flush_inner(inner: &mut WriterInner, format: OutputFormat) -> Result<()> {
        if inner.buffer.is_empty() {
            return Ok(());
        }

        let mut chunk = String::new();
        for rendered in inner.buffer.drain(..) {
            match format {
                OutputFormat::Jsonl | OutputFormat::Csv => {
                    chunk.push_str(&rendered);
                    chunk.push('\n');
                }
                OutputFormat::Json => {
                    if inner.any_record_written {
                        chunk.push_str(",\n");
                    } else {
                        chunk.push('\n');
                    }
                    chunk.push_str(&rendered);
                    inner.any_record_written = true;
                }
            }
        }

        inner.file.write_all(chunk.as_bytes()).await?;
        inner.file.flush().await?;
        Ok(())
    }
}

/// Quote a CSV field: wrap in double quotes, double internal quotes
fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::schema::{ScrapeMetadata, ScrapeStatus};

    fn record(url: &str) -> ScrapedContent {
        let now = Utc::now();
        ScrapedContent {
            url: url.to_string(),
            title: "A \"quoted\" title".to_string(),
            headings: vec!["One".to_string()],
            body_text: "hello world".to_string(),
            links: vec![],
            cleaned_html: "<p>hello world</p>".to_string(),
            metadata: ScrapeMetadata {
                crawled_at: now,
                scraped_at: now,
                fetch_duration_ms: 12,
                depth: 0,
                parent_url: None,
                status_code: 200,
                content_type: Some("text/html".to_string()),
                word_count: 2,
                language: "en".to_string(),
                content_hash: "abcd".to_string(),
                status: ScrapeStatus::Success,
                error_message: None,
            },
        }
    }

    #[test]
    fn test_csv_quote() {
        assert_eq!(csv_quote("plain"), "\"plain\"");
        assert_eq!(csv_quote("with \"quotes\""), "\"with \"\"quotes\"\"\"");
    }

    #[tokio::test]
    async fn test_jsonl_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = StreamingWriter::create(
            "job1",
            WriterConfig {
                output_dir: dir.path().to_path_buf(),
                format: OutputFormat::Jsonl,
                flush_every: 2,
                max_buffer: 10,
            },
        )
        .await
        .expect("create");

        for i in 0..5 {
            writer
                .write(&record(&format!("https://example.com/{i}")))
                .await
                .expect("write");
        }
        let meta = writer.close().await.expect("close");
        assert_eq!(meta.total_results, 5);

        let contents = std::fs::read_to_string(writer.path()).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), meta.total_results);
        for (i, line) in lines.iter().enumerate() {
            let parsed: ScrapedContent = serde_json::from_str(line).expect("valid record");
            assert_eq!(parsed.url, format!("https://example.com/{i}"));
        }
    }

    #[tokio::test]
    async fn test_json_array_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = StreamingWriter::create(
            "job2",
            WriterConfig {
                output_dir: dir.path().to_path_buf(),
                format: OutputFormat::Json,
                flush_every: 1,
                max_buffer: 10,
            },
        )
        .await
        .expect("create");

        for i in 0..3 {
            writer
                .write(&record(&format!("https://example.com/{i}")))
                .await
                .expect("write");
        }
        let meta = writer.close().await.expect("close");

        let contents = std::fs::read_to_string(writer.path()).expect("read");
        let parsed: Vec<ScrapedContent> = serde_json::from_str(&contents).expect("valid array");
        assert_eq!(parsed.len(), meta.total_results);
    }

    #[tokio::test]
    async fn test_empty_json_array_is_valid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = StreamingWriter::create(
            "job3",
            WriterConfig {
                output_dir: dir.path().to_path_buf(),
                format: OutputFormat::Json,
                ..WriterConfig::default()
            },
        )
        .await
        .expect("create");

        writer.close().await.expect("close");
        let contents = std::fs::read_to_string(
            dir.path().join("job3-results.json"),
        )
        .expect("read");
        let parsed: Vec<ScrapedContent> = serde_json::from_str(&contents).expect("valid array");
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn test_csv_output_and_meta() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = StreamingWriter::create(
            "job4",
            WriterConfig {
                output_dir: dir.path().to_path_buf(),
                format: OutputFormat::Csv,
                ..WriterConfig::default()
            },
        )
        .await
        .expect("create");

        writer.write(&record("https://example.com/")).await.expect("write");
        let meta = writer.close().await.expect("close");
        assert_eq!(meta.total_results, 1);

        let contents = std::fs::read_to_string(writer.path()).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("\"url\",\"title\""));
        assert!(lines[1].contains("\"A \"\"quoted\"\" title\""));

        let meta_raw =
            std::fs::read_to_string(dir.path().join("job4-meta.json")).expect("meta file");
        let parsed: WriterMeta = serde_json::from_str(&meta_raw).expect("valid meta");
        assert_eq!(parsed.total_results, 1);
        assert_eq!(parsed.job_id, "job4");
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = StreamingWriter::create(
            "job5",
            WriterConfig {
                output_dir: dir.path().to_path_buf(),
                ..WriterConfig::default()
            },
        )
        .await
        .expect("create");

        writer.close().await.expect("close");
        assert!(writer.write(&record("https://example.com/")).await.is_err());
    }
}
