use anyhow::Context;
use clap::Parser;
use fs_err as fs;
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

mod cli;
mod config;
mod errors;
mod generate;
mod host;
mod log;
mod pipeline;
mod resolve;
mod settings;
mod template;
mod ux;

use settings::{GenerationSettings, JsonSettingsStore, SettingsStore};

/// Config file values beat the built-in defaults; flags beat the config,
/// but only when actually passed.
fn apply_cli_overrides(cfg: &mut config::Config, args: &cli::Args) {
    if let Some(v) = &args.host_url {
        cfg.host_url = v.clone();
    }
    if let Some(v) = args.provider {
        cfg.provider = v;
    }
    if let Some(v) = &args.model {
        cfg.model = v.clone();
    }
    if let Some(v) = args.timeout_secs {
        cfg.timeout_secs = v;
    }
    if let Some(v) = args.history_limit {
        cfg.history_limit = v;
    }
}

/// Last saved settings are the baseline; each flag overrides its field only
/// when passed, so the edit history survives runs that do not touch it.
fn merge_settings(args: &cli::Args, stored: Option<GenerationSettings>) -> GenerationSettings {
    let mut s = stored.unwrap_or_default();
    if let Some(v) = args.kind {
        s.story_kind = v;
    }
    if let Some(v) = args.style {
        s.narrative_style = v;
    }
    if let Some(v) = args.chapters {
        s.chapter_count = v;
    }
    if let Some(v) = args.detail {
        s.detail_level = v;
    }
    if let Some(v) = &args.theme {
        s.story_theme = v.clone();
    }
    if let Some(v) = &args.requirements {
        s.special_requirements = v.clone();
    }
    if let Some(v) = args.include_summary {
        s.include_summary = v;
    }
    if let Some(v) = args.include_character_arcs {
        s.include_character_arcs = v;
    }
    if let Some(v) = args.include_thematic_analysis {
        s.include_thematic_analysis = v;
    }
    s.normalized()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    let mut cfg = config::Config::load(args.config.as_deref())?;
    apply_cli_overrides(&mut cfg, &args);

    // Last-used settings seed the free-text fields; every run writes back.
    let store = JsonSettingsStore::new(&cfg.settings_path);
    let settings = merge_settings(&args, store.load());
    if let Err(e) = store.save(&settings) {
        eprintln!("warning: could not persist settings: {e}");
    }

    let template = match &args.template_file {
        Some(p) => fs::read_to_string(p).with_context(|| format!("reading template {p}"))?,
        None => template::DEFAULT_TEMPLATE.to_string(),
    };

    let request = pipeline::GenerationRequest::new(settings, template);
    if args.debug {
        println!("debug: request {} at {}", request.id, request.created_at);
    }

    let host = host::http::HttpHost::connect(&cfg.host_url, cfg.timeout_secs, args.debug).await?;

    // ===== PHASE 1: RESOLVE + ASSEMBLE =====
    if args.dry_run {
        let prompt = pipeline::assemble(&host, &request, &cfg).await;
        ux::show_context(&prompt.bundle);
        ux::show_segments(&prompt.segments);
        let saved = log::save_stage(
            "generate",
            &prompt.segments,
            None,
            request.id,
            Path::new(&cfg.out_dir),
            args.save_request,
            false,
        )?;
        if args.debug {
            log::print_saved_paths("generate", &saved);
        }
        return Ok(());
    }

    let backend = generate::make_backend(
        cfg.provider,
        cfg.model.clone(),
        cfg.timeout_secs,
        cfg.ollama_url.clone(),
    );
    pipeline::ensure_backend(backend.as_ref()).await?;

    let prompt = pipeline::assemble(&host, &request, &cfg).await;
    ux::show_context(&prompt.bundle);
    if args.debug {
        log::print_segments_debug("generate", &prompt.segments)?;
    }

    if !args.yes && !ux::confirm("Send this prompt to the backend?") {
        println!("Aborted by user.");
        return Ok(());
    }

    // ===== PHASE 2: GENERATE =====
    let cancel = CancellationToken::new();
    let ctrl_c_guard = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_guard.cancel();
        }
    });

    let spinner = ux::spinner("generating outline...");
    let started = Instant::now();
    let result = generate::generate(backend.as_ref(), &prompt.segments, &cancel, args.debug).await;
    spinner.finish_and_clear();

    let outcome = result?;

    let saved = log::save_stage(
        "generate",
        &prompt.segments,
        Some(&outcome.text),
        request.id,
        Path::new(&cfg.out_dir),
        args.save_request,
        args.save_response,
    )?;
    if args.debug {
        log::print_saved_paths("generate", &saved);
    }

    ux::print_result_dashboard(&outcome.text, outcome.attempts, started.elapsed());

    if let Some(out) = &args.out {
        fs::write(out, &outcome.text).with_context(|| format!("writing outline to {out}"))?;
        println!("Outline written to {out}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::StoryKind;

    fn parse(argv: &[&str]) -> cli::Args {
        cli::Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn config_values_survive_unset_flags() {
        let args = parse(&["storyloom"]);
        let mut cfg = config::Config {
            model: "llama3".into(),
            history_limit: 7,
            timeout_secs: 90,
            ..Default::default()
        };
        apply_cli_overrides(&mut cfg, &args);
        assert_eq!(cfg.model, "llama3");
        assert_eq!(cfg.history_limit, 7);
        assert_eq!(cfg.timeout_secs, 90);
    }

    #[test]
    fn explicit_flags_override_config() {
        let args = parse(&["storyloom", "--model", "gpt-4o", "--history-limit", "3"]);
        let mut cfg = config::Config {
            model: "llama3".into(),
            history_limit: 7,
            ..Default::default()
        };
        apply_cli_overrides(&mut cfg, &args);
        assert_eq!(cfg.model, "gpt-4o");
        assert_eq!(cfg.history_limit, 3);
    }

    #[test]
    fn stored_settings_win_when_flags_are_absent() {
        let args = parse(&["storyloom"]);
        let stored = GenerationSettings {
            story_kind: StoryKind::Horror,
            chapter_count: 9,
            include_character_arcs: true,
            story_theme: "old debts".into(),
            ..Default::default()
        };
        let merged = merge_settings(&args, Some(stored));
        assert_eq!(merged.story_kind, StoryKind::Horror);
        assert_eq!(merged.chapter_count, 9);
        assert!(merged.include_character_arcs);
        assert_eq!(merged.story_theme, "old debts");
    }

    #[test]
    fn explicit_flags_override_stored_settings() {
        let args = parse(&[
            "storyloom",
            "--kind",
            "mystery",
            "--chapters",
            "4",
            "--include-character-arcs",
            "false",
            "--theme",
            "new leads",
        ]);
        let stored = GenerationSettings {
            story_kind: StoryKind::Horror,
            chapter_count: 9,
            include_character_arcs: true,
            story_theme: "old debts".into(),
            ..Default::default()
        };
        let merged = merge_settings(&args, Some(stored));
        assert_eq!(merged.story_kind, StoryKind::Mystery);
        assert_eq!(merged.chapter_count, 4);
        assert!(!merged.include_character_arcs);
        assert_eq!(merged.story_theme, "new leads");
    }
}
