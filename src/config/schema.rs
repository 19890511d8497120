//! Configuration schema types for `mill.toml`
//!
//! Defines the structure and validation rules for sitemill project configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Project metadata and root directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Source root containing styles/, templates/, scripts/, img/
    #[serde(default = "default_source")]
    pub source: PathBuf,
    /// Development output root
    #[serde(default = "default_dev")]
    pub dev: PathBuf,
    /// Production output root
    #[serde(default = "default_publish")]
    pub publish: PathBuf,
}

fn default_source() -> PathBuf {
    PathBuf::from("src")
}

fn default_dev() -> PathBuf {
    PathBuf::from("dev")
}

fn default_publish() -> PathBuf {
    PathBuf::from("public")
}

/// Stylesheet stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Glob patterns for stylesheet sources, relative to the source root
    #[serde(default = "default_styles_include")]
    pub include: Vec<String>,
    /// Glob patterns to exclude
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Destination subdirectory within each output root
    #[serde(default = "default_styles_dest")]
    pub dest: String,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            include: default_styles_include(),
            exclude: vec![],
            dest: default_styles_dest(),
        }
    }
}

fn default_styles_include() -> Vec<String> {
    vec!["styles/*.css".to_string()]
}

fn default_styles_dest() -> String {
    "styles".to_string()
}

/// Template (markup) stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Glob patterns for page templates, relative to the source root
    #[serde(default = "default_templates_include")]
    pub include: Vec<String>,
    /// Glob patterns to exclude (partials are excluded by default)
    #[serde(default = "default_templates_exclude")]
    pub exclude: Vec<String>,
    /// Directory of partial templates available to every page
    #[serde(default = "default_partials")]
    pub partials: PathBuf,
    /// File stem exempt from flatten-to-directory renaming
    #[serde(default = "default_index_stem")]
    pub index: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            include: default_templates_include(),
            exclude: default_templates_exclude(),
            partials: default_partials(),
            index: default_index_stem(),
        }
    }
}

fn default_templates_include() -> Vec<String> {
    vec!["templates/*.tera".to_string()]
}

fn default_templates_exclude() -> Vec<String> {
    vec!["templates/partials/**".to_string()]
}

fn default_partials() -> PathBuf {
    PathBuf::from("templates/partials")
}

fn default_index_stem() -> String {
    "index".to_string()
}

/// Script stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Glob patterns for script sources, relative to the source root
    #[serde(default = "default_scripts_include")]
    pub include: Vec<String>,
    /// Glob patterns to exclude
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Destination subdirectory within each output root
    #[serde(default = "default_scripts_dest")]
    pub dest: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            include: default_scripts_include(),
            exclude: vec![],
            dest: default_scripts_dest(),
        }
    }
}

fn default_scripts_include() -> Vec<String> {
    vec!["scripts/*.js".to_string()]
}

fn default_scripts_dest() -> String {
    "scripts".to_string()
}

/// Responsive image stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Glob patterns for image sources, relative to the source root
    #[serde(default = "default_images_include")]
    pub include: Vec<String>,
    /// Filename suffix marking images that must not be resized
    #[serde(default = "default_lazy_suffix")]
    pub lazy_suffix: String,
    /// Widths (in pixels) to resize each image to
    #[serde(default = "default_widths")]
    pub widths: Vec<u32>,
    /// JPEG encoding quality (1-100)
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// Destination subdirectory within each output root
    #[serde(default = "default_images_dest")]
    pub dest: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            include: default_images_include(),
            lazy_suffix: default_lazy_suffix(),
            widths: default_widths(),
            quality: default_quality(),
            dest: default_images_dest(),
        }
    }
}

fn default_images_include() -> Vec<String> {
    vec![
        "img/**/*.jpg".to_string(),
        "img/**/*.png".to_string(),
        "img/**/*.gif".to_string(),
    ]
}

fn default_lazy_suffix() -> String {
    "-lazy".to_string()
}

fn default_widths() -> Vec<u32> {
    vec![800, 1080, 1440]
}

fn default_quality() -> u8 {
    85
}

fn default_images_dest() -> String {
    "img".to_string()
}

/// Typeface stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontsConfig {
    /// Glob patterns for font sources, relative to the source root
    #[serde(default = "default_fonts_include")]
    pub include: Vec<String>,
    /// Destination subdirectory within each output root
    #[serde(default = "default_fonts_dest")]
    pub dest: String,
}

impl Default for FontsConfig {
    fn default() -> Self {
        Self { include: default_fonts_include(), dest: default_fonts_dest() }
    }
}

fn default_fonts_include() -> Vec<String> {
    vec!["styles/*.woff".to_string(), "styles/*.woff2".to_string()]
}

fn default_fonts_dest() -> String {
    "fonts".to_string()
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default = "default_true")]
    pub clear_screen: bool,
}

fn default_debounce_ms() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100, clear_screen: true }
    }
}

/// Complete mill.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Project metadata and roots (required)
    pub project: ProjectConfig,
    /// Stylesheet stage settings
    #[serde(default)]
    pub styles: StylesConfig,
    /// Template stage settings
    #[serde(default)]
    pub templates: TemplatesConfig,
    /// Script stage settings
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Responsive image stage settings
    #[serde(default)]
    pub images: ImagesConfig,
    /// Typeface stage settings
    #[serde(default)]
    pub fonts: FontsConfig,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "images.widths")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mill.toml: '{}' {}", self.field, self.message)
    }
}

impl SiteConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.name".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        // The three roots are the filesystem contract: they must never overlap.
        let roots = [
            ("project.source", &self.project.source),
            ("project.dev", &self.project.dev),
            ("project.publish", &self.project.publish),
        ];
        for (i, (field_a, root_a)) in roots.iter().enumerate() {
            for (field_b, root_b) in roots.iter().skip(i + 1) {
                if root_a == root_b || root_a.starts_with(root_b) || root_b.starts_with(root_a) {
                    errors.push(ConfigValidationError {
                        field: format!("{} / {}", field_a, field_b),
                        message: format!(
                            "roots '{}' and '{}' overlap",
                            root_a.display(),
                            root_b.display()
                        ),
                    });
                }
            }
        }

        if self.images.widths.is_empty() {
            errors.push(ConfigValidationError {
                field: "images.widths".to_string(),
                message: "must contain at least one width".to_string(),
            });
        }
        if self.images.widths.iter().any(|w| *w == 0) {
            errors.push(ConfigValidationError {
                field: "images.widths".to_string(),
                message: "widths must be positive".to_string(),
            });
        }
        if self.images.quality == 0 || self.images.quality > 100 {
            errors.push(ConfigValidationError {
                field: "images.quality".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }

        if self.watch.debounce_ms == 0 {
            errors.push(ConfigValidationError {
                field: "watch.debounce_ms".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
