//! PDF page rasterization through poppler (`pdfinfo` + `pdftoppm`)

use crate::codec;
use crate::command::{run_tool, stderr_tail};
use crate::error::ProcessorError;
use crate::processor::{ProcessOptions, Processor, ProcessorResult, ResultMetadata};
use async_trait::async_trait;
use bytes::Bytes;
use std::ffi::OsString;
use std::path::Path;

/// Raster size when neither width nor height is requested
pub const DEFAULT_SCALE: u32 = 1024;

/// Normalize an output format: `jpg` aliases `jpeg`, unknown becomes `png`
pub fn normalize_format(format: Option<&str>) -> &'static str {
    match format.map(|f| f.trim().to_lowercase()).as_deref() {
        Some("jpeg") | Some("jpg") => "jpeg",
        _ => "png",
    }
}

/// Whether pdfinfo reports an encrypted or password-protected file.
///
/// On stdout only the value of the `Encrypted:` field counts, so document
/// metadata mentioning encryption is ignored. Poppler's password and
/// encryption errors arrive on stderr.
pub fn is_encrypted(stdout: &str, stderr: &str) -> bool {
    let flagged = stdout.lines().any(|line| {
        line.trim_start()
            .strip_prefix("Encrypted:")
            .is_some_and(|value| value.trim().to_lowercase().starts_with("yes"))
    });
    if flagged {
        return true;
    }
    let stderr = stderr.to_lowercase();
    stderr.contains("incorrect password") || stderr.contains("encrypted")
}

/// Page count from pdfinfo output
pub fn parse_page_count(output: &str) -> Option<u32> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|value| value.trim().parse().ok())
}

pub struct PdfProcessor {
    pdfinfo_path: String,
    pdftoppm_path: String,
}

impl PdfProcessor {
    pub fn new(pdfinfo_path: impl Into<String>, pdftoppm_path: impl Into<String>) -> Self {
        Self {
            pdfinfo_path: pdfinfo_path.into(),
            pdftoppm_path: pdftoppm_path.into(),
        }
    }

    /// Probe the page count, rejecting empty and encrypted documents
    async fn page_count(&self, pdf_path: &Path) -> Result<u32, ProcessorError> {
        let output = run_tool(&self.pdfinfo_path, [pdf_path.as_os_str()])
            .await
            .map_err(|e| tool_error(&self.pdfinfo_path, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if is_encrypted(&stdout, &stderr) {
            return Err(ProcessorError::PdfEncrypted);
        }

        if !output.status.success() {
            return Err(ProcessorError::CorruptedFile(format!(
                "pdfinfo failed: {}",
                stderr_tail(&output)
            )));
        }

        match parse_page_count(&stdout) {
            Some(0) | None => Err(ProcessorError::PdfEmpty),
            Some(count) => Ok(count),
        }
    }
}

impl Default for PdfProcessor {
    fn default() -> Self {
        Self::new("pdfinfo", "pdftoppm")
    }
}

fn tool_error(program: &str, e: std::io::Error) -> ProcessorError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ProcessorError::ProcessingFailed(format!("{program} not found"))
    } else {
        ProcessorError::Io(e)
    }
}

#[async_trait]
impl Processor for PdfProcessor {
    fn name(&self) -> &'static str {
        "pdf_thumbnail"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        &["application/pdf"]
    }

    #[tracing::instrument(skip(self, options, input), fields(size_bytes = input.len()))]
    async fn process(
        &self,
        options: Option<&ProcessOptions>,
        input: Bytes,
    ) -> Result<ProcessorResult, ProcessorError> {
        if !input.starts_with(b"%PDF") {
            return Err(ProcessorError::CorruptedFile(
                "input is not a PDF document".to_string(),
            ));
        }

        let defaults = ProcessOptions::default();
        let options = options.unwrap_or(&defaults);
        let page = options.page.unwrap_or(1).max(1);
        let format = normalize_format(options.format.as_deref());
        let scale = match options.width.max(options.height) {
            0 => DEFAULT_SCALE,
            n => n,
        };

        let dir = tempfile::tempdir()?;
        let pdf_path = dir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, &input).await?;

        let count = self.page_count(&pdf_path).await?;
        if page > count {
            return Err(ProcessorError::PageOutOfRange { page, count });
        }

        let out_prefix = dir.path().join("page");
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            page.to_string().into(),
            "-l".into(),
            page.to_string().into(),
            "-singlefile".into(),
            "-scale-to".into(),
            scale.to_string().into(),
        ];
        if format == "jpeg" {
            let quality = codec::clamp_quality(options.quality);
            args.push("-jpeg".into());
            args.push("-jpegopt".into());
            args.push(format!("quality={quality}").into());
        } else {
            args.push("-png".into());
        }
        args.push(pdf_path.into_os_string());
        args.push(out_prefix.clone().into_os_string());

        let output = run_tool(&self.pdftoppm_path, &args)
            .await
            .map_err(|e| tool_error(&self.pdftoppm_path, e))?;
        if !output.status.success() {
            return Err(ProcessorError::ProcessingFailed(format!(
                "pdftoppm failed: {}",
                stderr_tail(&output)
            )));
        }

        let (extension, content_type) = match format {
            "jpeg" => ("jpg", "image/jpeg"),
            _ => ("png", "image/png"),
        };
        let data = tokio::fs::read(out_prefix.with_extension(extension)).await?;
        let (width, height, _) = codec::probe_header(&data)?;

        tracing::debug!(page = page, pages = count, width = width, height = height, "PDF page rendered");

        Ok(ProcessorResult::new(data, content_type)
            .with_filename(format!("page_{page}.{extension}"))
            .with_metadata(ResultMetadata {
                width: Some(width),
                height: Some(height),
                format: Some(format.to_string()),
                ..Default::default()
            }))
    }
}
