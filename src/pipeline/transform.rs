//! File transforms applied by pipeline stages.
//!
//! A [`Transform`] maps one source file to zero or more in-memory outputs.
//! Stages own the surrounding concerns (destination mapping, writing,
//! caching); transforms only produce bytes. CSS, templates, and images are
//! delegated to lightningcss, tera, and the image crate respectively.

use crate::pipeline::source::SourceFile;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tera::Tera;
use thiserror::Error;

/// Per-file transform failure. Recorded in the stage result; never aborts
/// the stage.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Source file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// CSS parse or print error
    #[error("CSS error in {}: {message}", path.display())]
    Css { path: PathBuf, message: String },
    /// Template load or render error
    #[error("Template error in {}: {source}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: tera::Error,
    },
    /// Image decode, resize, or encode error
    #[error("Image error in {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// An output produced by a transform, relative to the stage destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Path relative to the stage's destination directory
    pub relative: PathBuf,
    /// File contents
    pub contents: Vec<u8>,
}

/// A file transform. Implementations must be shareable across the worker
/// threads a stage fans files out on.
pub trait Transform: Send + Sync {
    /// Short name used in logs and dry-run output.
    fn name(&self) -> &str;

    /// Apply the transform to one file.
    ///
    /// The file's `relative` path is relative to the stage base, so a
    /// passthrough transform echoes it unchanged.
    fn apply(&self, file: &SourceFile) -> Result<Vec<OutputFile>, TransformError>;
}

fn read_source(file: &SourceFile) -> Result<Vec<u8>, TransformError> {
    std::fs::read(&file.path)
        .map_err(|e| TransformError::Io { path: file.path.clone(), source: e })
}

/// Byte-for-byte passthrough. Used for scripts, fonts, image originals, and
/// the production copy stages.
#[derive(Debug, Default)]
pub struct CopyFile;

impl Transform for CopyFile {
    fn name(&self) -> &str {
        "copy"
    }

    fn apply(&self, file: &SourceFile) -> Result<Vec<OutputFile>, TransformError> {
        Ok(vec![OutputFile { relative: file.relative.clone(), contents: read_source(file)? }])
    }
}

/// Parse and reprint CSS. With `minify` set the output is compacted for
/// production.
#[derive(Debug)]
pub struct Stylesheet {
    minify: bool,
}

impl Stylesheet {
    /// Development stylesheet pass: parse and reprint without minification.
    pub fn new() -> Self {
        Self { minify: false }
    }

    /// Production stylesheet pass: parse and minify.
    pub fn minified() -> Self {
        Self { minify: true }
    }
}

impl Default for Stylesheet {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for Stylesheet {
    fn name(&self) -> &str {
        if self.minify {
            "stylesheet-minify"
        } else {
            "stylesheet"
        }
    }

    fn apply(&self, file: &SourceFile) -> Result<Vec<OutputFile>, TransformError> {
        let bytes = read_source(file)?;
        let source = String::from_utf8_lossy(&bytes);

        let sheet = match StyleSheet::parse(&source, ParserOptions::default()) {
            Ok(sheet) => sheet,
            Err(e) => {
                return Err(TransformError::Css {
                    path: file.path.clone(),
                    message: e.to_string(),
                })
            }
        };

        let printed = sheet
            .to_css(PrinterOptions { minify: self.minify, ..PrinterOptions::default() })
            .map_err(|e| TransformError::Css {
                path: file.path.clone(),
                message: e.to_string(),
            })?;

        Ok(vec![OutputFile {
            relative: file.relative.clone(),
            contents: printed.code.into_bytes(),
        }])
    }
}

/// Render page templates to HTML with tera, with a shared partials
/// directory available to every page.
///
/// Partials are re-read on every apply, so an edited partial shows up in
/// the next render of a watch session. Outputs are flattened to
/// directories for clean URLs: `about.html.tera` renders to
/// `about/index.html`. The configured index stem (normally `index`) is
/// exempt and lands at the destination root as `index.html`.
pub struct Template {
    partials_dir: PathBuf,
    index: String,
}

impl Template {
    /// Create a template transform. Loads the partials once up front so a
    /// broken partial fails at setup rather than on the first render.
    pub fn new(partials_dir: &Path, index: &str) -> Result<Self, TransformError> {
        let transform =
            Self { partials_dir: partials_dir.to_path_buf(), index: index.to_string() };
        transform.load_partials()?;
        Ok(transform)
    }

    /// Build an engine holding the current contents of the partials
    /// directory. A missing partials directory is treated as having no
    /// partials.
    fn load_partials(&self) -> Result<Tera, TransformError> {
        let mut tera = Tera::default();

        if self.partials_dir.is_dir() {
            let mut partials = Vec::new();
            collect_template_files(&self.partials_dir, &mut partials).map_err(|e| {
                TransformError::Io { path: self.partials_dir.clone(), source: e }
            })?;

            for path in partials {
                let name = path
                    .strip_prefix(&self.partials_dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| TransformError::Io { path: path.clone(), source: e })?;
                tera.add_raw_template(&name, &contents)
                    .map_err(|e| TransformError::Template { path: path.clone(), source: e })?;
            }
        }

        Ok(tera)
    }

    /// Map a page file name to its rendered output path.
    fn output_path(&self, file_name: &str) -> PathBuf {
        let page = file_name.strip_suffix(".tera").unwrap_or(file_name);
        let stem = page.strip_suffix(".html").unwrap_or(page);

        if stem == self.index {
            PathBuf::from(format!("{}.html", stem))
        } else {
            PathBuf::from(stem).join("index.html")
        }
    }
}

impl Transform for Template {
    fn name(&self) -> &str {
        "template"
    }

    fn apply(&self, file: &SourceFile) -> Result<Vec<OutputFile>, TransformError> {
        let bytes = read_source(file)?;
        let source = String::from_utf8_lossy(&bytes).into_owned();

        let file_name = file
            .relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Each page gets its own engine, built from the partials as they
        // are on disk right now, so concurrent renders never see each
        // other's page template.
        let mut tera = self.load_partials()?;
        tera.add_raw_template(&file_name, &source)
            .map_err(|e| TransformError::Template { path: file.path.clone(), source: e })?;

        let html = tera
            .render(&file_name, &tera::Context::new())
            .map_err(|e| TransformError::Template { path: file.path.clone(), source: e })?;

        Ok(vec![OutputFile { relative: self.output_path(&file_name), contents: html.into_bytes() }])
    }
}

/// Resize images to a set of responsive widths, suffixing each variant
/// with `-{width}w`. Variants that would enlarge the original are skipped.
///
/// With `with_original_copy` the untouched source bytes are emitted
/// alongside the variants. With `with_lazy_suffix`, files whose stem ends
/// with the suffix are passed through unresized; they exist to be tiny.
/// Gifs are copied, never resized.
#[derive(Debug)]
pub struct ImageResize {
    widths: Vec<u32>,
    quality: u8,
    copy_original: bool,
    lazy_suffix: Option<String>,
}

impl ImageResize {
    pub fn new(widths: Vec<u32>, quality: u8) -> Self {
        Self { widths, quality, copy_original: false, lazy_suffix: None }
    }

    /// Also emit the original file, byte for byte.
    pub fn with_original_copy(mut self) -> Self {
        self.copy_original = true;
        self
    }

    /// Skip resizing for files whose stem ends with `suffix`.
    pub fn with_lazy_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.lazy_suffix = Some(suffix.into());
        self
    }

    fn encode(
        &self,
        img: &image::DynamicImage,
        extension: &str,
        path: &Path,
    ) -> Result<Vec<u8>, TransformError> {
        let mut buf = Vec::new();
        let format = match extension {
            "jpg" | "jpeg" => image::ImageOutputFormat::Jpeg(self.quality),
            _ => image::ImageOutputFormat::Png,
        };
        img.write_to(&mut Cursor::new(&mut buf), format)
            .map_err(|e| TransformError::Image { path: path.to_path_buf(), source: e })?;
        Ok(buf)
    }
}

impl Transform for ImageResize {
    fn name(&self) -> &str {
        "image-resize"
    }

    fn apply(&self, file: &SourceFile) -> Result<Vec<OutputFile>, TransformError> {
        let stem = file
            .relative
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = file
            .relative
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent = file.relative.parent().unwrap_or(Path::new(""));

        let mut outputs = Vec::new();
        if self.copy_original {
            outputs.push(OutputFile {
                relative: file.relative.clone(),
                contents: read_source(file)?,
            });
        }

        let lazy = self.lazy_suffix.as_deref().is_some_and(|s| stem.ends_with(s));
        // An animated gif would keep only its first frame through a resize
        if lazy || extension.eq_ignore_ascii_case("gif") {
            return Ok(outputs);
        }

        let img = image::open(&file.path)
            .map_err(|e| TransformError::Image { path: file.path.clone(), source: e })?;

        for &width in &self.widths {
            if img.width() <= width {
                // Never enlarge
                continue;
            }

            let resized = img.resize(width, u32::MAX, image::imageops::FilterType::Lanczos3);
            let contents = self.encode(&resized, &extension, &file.path)?;
            let name = format!("{}-{}w.{}", stem, width, extension);
            outputs.push(OutputFile { relative: parent.join(name), contents });
        }

        Ok(outputs)
    }
}

/// Production script pass.
///
/// Currently a conservative passthrough; kept as a distinct transform so
/// production scripts stay a separate stage with its own name in logs.
#[derive(Debug, Default)]
pub struct MinifyScript;

impl Transform for MinifyScript {
    fn name(&self) -> &str {
        "minify-script"
    }

    fn apply(&self, file: &SourceFile) -> Result<Vec<OutputFile>, TransformError> {
        Ok(vec![OutputFile { relative: file.relative.clone(), contents: read_source(file)? }])
    }
}

/// Collect template files recursively under a directory.
fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_template_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
