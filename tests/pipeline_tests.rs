//! Pipeline integration tests
//!
//! End-to-end coverage of the asset pipeline: source selection, stage
//! runs, change-cache idempotence, template flattening, registry
//! validation, and the develop/production round trip.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use sitemill::config::{default_config, SiteConfig};
use sitemill::pipeline::{
    ChangeCache, Concurrency, CopyFile, Orchestrator, RegistryError, SourceSpec, Stage,
    Stylesheet,
};

// ============================================================================
// Test Utilities
// ============================================================================

fn write_file(root: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(&path).unwrap().write_all(content).unwrap();
    path
}

fn write_image(root: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    image::RgbaImage::from_pixel(width, height, image::Rgba([40, 80, 120, 255]))
        .save(&path)
        .unwrap();
    path
}

/// A minimal but complete source tree matching the default config layout.
fn scaffold_site(root: &Path) {
    write_file(root, "src/styles/main.css", b"body {\n  margin: 0px;\n  color: #222222;\n}\n");
    write_file(root, "src/styles/site.woff", b"woff bytes");
    write_file(
        root,
        "src/templates/partials/footer.html",
        b"<footer>made with care</footer>",
    );
    write_file(
        root,
        "src/templates/index.html.tera",
        b"<h1>home</h1>{% include \"footer.html\" %}",
    );
    write_file(
        root,
        "src/templates/about.html.tera",
        b"<h1>about</h1>{% include \"footer.html\" %}",
    );
    write_file(root, "src/scripts/app.js", b"document.title = 'site';");
    write_image(root, "src/img/hero.jpg", 1600, 900);
    write_image(root, "src/img/hero-lazy.jpg", 32, 18);
}

fn site_orchestrator(root: &Path) -> (SiteConfig, Orchestrator) {
    let config = default_config();
    let orch = Orchestrator::from_config(&config, root).unwrap();
    (config, orch)
}

// ============================================================================
// Develop group
// ============================================================================

#[test]
fn develop_builds_all_asset_kinds() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    let result = orch.run("develop").unwrap();
    assert!(result.is_success(), "develop failed: {}", result.summary());

    let dev = temp.path().join("dev");
    assert!(dev.join("styles/main.css").is_file());
    assert!(dev.join("fonts/site.woff").is_file());
    assert!(dev.join("scripts/app.js").is_file());
    assert!(dev.join("index.html").is_file());
    assert!(dev.join("about/index.html").is_file());
    assert!(dev.join("img/hero.jpg").is_file());
}

#[test]
fn markup_flattens_pages_except_index() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    orch.run("markup").unwrap();

    let dev = temp.path().join("dev");
    assert!(dev.join("index.html").is_file());
    assert!(!dev.join("index/index.html").exists());
    assert!(dev.join("about/index.html").is_file());
    assert!(!dev.join("about.html").exists());

    let about = fs::read_to_string(dev.join("about/index.html")).unwrap();
    assert!(about.contains("<h1>about</h1>"));
    assert!(about.contains("made with care"));
}

#[test]
fn partial_edit_is_rendered_on_markup_rerun() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    orch.run("markup").unwrap();
    let about = temp.path().join("dev/about/index.html");
    assert!(fs::read_to_string(&about).unwrap().contains("made with care"));

    write_file(
        temp.path(),
        "src/templates/partials/footer.html",
        b"<footer>rebuilt</footer>",
    );
    orch.run("markup").unwrap();

    let html = fs::read_to_string(&about).unwrap();
    assert!(html.contains("rebuilt"));
    assert!(!html.contains("made with care"));
}

#[test]
fn images_emit_responsive_variants_and_original() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    let result = orch.run("images").unwrap();
    assert!(result.is_success());

    let img = temp.path().join("dev/img");
    assert!(img.join("hero.jpg").is_file());
    assert!(img.join("hero-800w.jpg").is_file());
    assert!(img.join("hero-1080w.jpg").is_file());
    assert!(img.join("hero-1440w.jpg").is_file());

    let variant = image::open(img.join("hero-800w.jpg")).unwrap();
    assert_eq!(variant.width(), 800);
}

#[test]
fn lazy_images_are_copied_but_never_resized() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    orch.run("images").unwrap();

    let img = temp.path().join("dev/img");
    assert!(img.join("hero-lazy.jpg").is_file());
    assert!(!img.join("hero-lazy-800w.jpg").exists());
}

#[test]
fn gifs_are_copied_through_develop_and_production() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    write_image(temp.path(), "src/img/loader.gif", 1600, 900);
    let (_, orch) = site_orchestrator(temp.path());

    orch.run("develop").unwrap();
    let source = fs::read(temp.path().join("src/img/loader.gif")).unwrap();
    let dev_gif = temp.path().join("dev/img/loader.gif");
    assert_eq!(fs::read(&dev_gif).unwrap(), source);
    assert!(!temp.path().join("dev/img/loader-800w.gif").exists());

    orch.run("production").unwrap();
    assert!(temp.path().join("public/img/loader.gif").is_file());
}

#[test]
fn image_rerun_with_no_changes_is_skipped() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    let first = orch.run("images").unwrap();
    assert_eq!(first.total_processed(), 2);
    assert_eq!(first.total_skipped(), 0);

    let hero = temp.path().join("dev/img/hero-800w.jpg");
    let before = fs::read(&hero).unwrap();

    let second = orch.run("images").unwrap();
    assert_eq!(second.total_processed(), 0);
    assert_eq!(second.total_skipped(), 2);
    assert_eq!(fs::read(&hero).unwrap(), before);
}

#[test]
fn modified_image_is_reprocessed() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    orch.run("images").unwrap();
    write_image(temp.path(), "src/img/hero.jpg", 2000, 1000);

    let result = orch.run("images").unwrap();
    assert_eq!(result.total_processed(), 1);
    assert_eq!(result.total_skipped(), 1);
}

#[test]
fn zero_match_stage_succeeds_with_nothing_processed() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src")).unwrap();
    let (_, orch) = site_orchestrator(temp.path());

    let result = orch.run("styles").unwrap();
    assert!(result.is_success());
    assert_eq!(result.total_processed(), 0);
}

#[test]
fn corrupt_image_degrades_run_but_does_not_fail_it() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    write_file(temp.path(), "src/img/broken.jpg", b"definitely not a jpeg");
    let (_, orch) = site_orchestrator(temp.path());

    let result = orch.run("images").unwrap();
    assert!(result.is_success());
    assert_eq!(result.total_errors(), 1);
    // The broken file still got its original copied before decode failed
    assert!(temp.path().join("dev/img/hero-800w.jpg").is_file());
}

// ============================================================================
// Production group
// ============================================================================

#[test]
fn production_publishes_from_dev_root() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    orch.run("develop").unwrap();
    let result = orch.run("production").unwrap();
    assert!(result.is_success(), "production failed: {}", result.summary());

    let public = temp.path().join("public");
    assert!(public.join("styles/main.css").is_file());
    assert!(public.join("index.html").is_file());
    assert!(public.join("about/index.html").is_file());
    assert!(public.join("scripts/app.js").is_file());
    assert!(public.join("img/hero-800w.jpg").is_file());
    assert!(public.join("fonts/site.woff").is_file());
}

#[test]
fn production_css_is_minified() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    orch.run("develop").unwrap();
    orch.run("production").unwrap();

    let dev_css = fs::read_to_string(temp.path().join("dev/styles/main.css")).unwrap();
    let pub_css = fs::read_to_string(temp.path().join("public/styles/main.css")).unwrap();
    assert!(pub_css.len() < dev_css.len());
    assert!(!pub_css.contains('\n'));
}

#[test]
fn production_without_dev_outputs_is_a_clean_noop() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    let result = orch.run("production").unwrap();
    assert!(result.is_success());
    assert_eq!(result.total_processed(), 0);
}

// ============================================================================
// Source selection
// ============================================================================

#[test]
fn overlapping_patterns_select_each_file_once() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "src/img/a.jpg", b"jpg");

    let spec = SourceSpec::new(vec![
        "img/**/*.jpg".to_string(),
        "img/a.jpg".to_string(),
        "img/*.jpg".to_string(),
    ]);
    let files = spec.resolve(&temp.path().join("src")).unwrap();
    assert_eq!(files.len(), 1);
}

#[test]
fn exclusion_beats_inclusion() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "src/img/keep.png", b"png");
    write_file(temp.path(), "src/img/skip-lazy.png", b"png");

    let spec = SourceSpec::new(vec!["img/*.png".to_string()])
        .with_excludes(vec!["**/*-lazy.png".to_string()]);
    let files = spec.resolve(&temp.path().join("src")).unwrap();

    assert_eq!(files.len(), 1);
    assert!(files[0].relative.ends_with("keep.png"));
}

// ============================================================================
// Registry validation
// ============================================================================

#[test]
fn duplicate_destination_is_rejected_before_any_run() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("out/assets");
    let mut orch = Orchestrator::new();

    orch.register(Stage::new(
        "first",
        temp.path(),
        SourceSpec::new(vec!["*.css".to_string()]),
        Box::new(Stylesheet::new()),
        &dest,
    ))
    .unwrap();

    let err = orch
        .register(Stage::new(
            "second",
            temp.path(),
            SourceSpec::new(vec!["*.js".to_string()]),
            Box::new(CopyFile),
            &dest,
        ))
        .unwrap_err();

    assert!(matches!(err, RegistryError::DuplicateDestination { .. }));
    // Nothing ran, nothing was written
    assert!(!dest.exists());
}

#[test]
fn unknown_task_is_an_error() {
    let temp = TempDir::new().unwrap();
    let (_, orch) = site_orchestrator(temp.path());

    let err = orch.run("deploy").unwrap_err();
    assert!(matches!(err, RegistryError::UnknownTask(_)));
}

#[test]
fn sequential_group_runs_in_declaration_order() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "src/a.txt", b"a");

    let mut orch = Orchestrator::new();
    for name in ["one", "two", "three"] {
        orch.register(Stage::new(
            name,
            temp.path().join("src"),
            SourceSpec::new(vec!["*.txt".to_string()]),
            Box::new(CopyFile),
            temp.path().join("out").join(name),
        ))
        .unwrap();
    }
    orch.define_group(
        "all",
        vec!["one".to_string(), "two".to_string(), "three".to_string()],
        Concurrency::Sequential,
    )
    .unwrap();

    let result = orch.run("all").unwrap();
    let order: Vec<_> = result.stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(order, vec!["one", "two", "three"]);
}

#[test]
fn parallel_group_completes_every_stage() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    let result = orch.run("develop").unwrap();
    assert_eq!(result.stages.len(), 5);

    let mut names: Vec<_> = result.stages.iter().map(|s| s.stage.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["fonts", "images", "markup", "scripts", "styles"]);
}

// ============================================================================
// Stage-level behavior
// ============================================================================

#[test]
fn stage_run_is_idempotent_for_copies() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "src/scripts/app.js", b"let x = 1;");

    let stage = Stage::new(
        "scripts",
        temp.path().join("src"),
        SourceSpec::new(vec!["scripts/*.js".to_string()]),
        Box::new(CopyFile),
        temp.path().join("dev/scripts"),
    )
    .with_base("scripts");

    let cache = ChangeCache::new();
    stage.run(&cache);
    stage.run(&cache);

    let out = fs::read(temp.path().join("dev/scripts/app.js")).unwrap();
    assert_eq!(out, b"let x = 1;");
}

#[test]
fn dry_resolution_lists_files_without_writing() {
    let temp = TempDir::new().unwrap();
    scaffold_site(temp.path());
    let (_, orch) = site_orchestrator(temp.path());

    let files = orch.stage("scripts").unwrap().resolve().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].relative, PathBuf::from("app.js"));
    assert!(!temp.path().join("dev").exists());
}
