use fs_err as fs;
use serde_json::to_string_pretty;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::template::PromptSegment;

pub struct SavedPaths {
    pub dir: PathBuf,
    pub request: Option<PathBuf>,
    pub response: Option<PathBuf>,
}

fn tx_dir(out_dir: &Path, tx: Uuid) -> PathBuf {
    out_dir.join("tx").join(tx.to_string())
}

/// Persist the prompt segments and/or the raw backend response for one
/// generation, keyed by the request id.
pub fn save_stage(
    stage: &str,
    segments: &[PromptSegment],
    response: Option<&str>,
    tx: Uuid,
    out_dir: &Path,
    save_request: bool,
    save_response: bool,
) -> anyhow::Result<SavedPaths> {
    let dir = tx_dir(out_dir, tx);
    fs::create_dir_all(&dir)?;

    let mut request_path = None;
    let mut response_path = None;

    if save_request {
        let p = dir.join(format!("{stage}.request.json"));
        fs::write(&p, to_string_pretty(segments)?)?;
        request_path = Some(p);
    }

    if save_response {
        if let Some(text) = response {
            let p = dir.join(format!("{stage}.response.txt"));
            fs::write(&p, text)?;
            response_path = Some(p);
        }
    }

    Ok(SavedPaths { dir, request: request_path, response: response_path })
}

pub fn print_saved_paths(stage: &str, saved: &SavedPaths) {
    println!("debug[{stage}]: artifacts directory: {}", saved.dir.display());
    if let Some(p) = &saved.request {
        println!("debug[{stage}]: request saved at: {}", p.display());
    } else {
        println!("debug[{stage}]: request not saved (flag off)");
    }
    if let Some(p) = &saved.response {
        println!("debug[{stage}]: response saved at: {}", p.display());
    } else {
        println!("debug[{stage}]: response not saved (flag off)");
    }
    std::io::stdout().flush().ok();
}

pub fn print_segments_debug(stage: &str, segments: &[PromptSegment]) -> anyhow::Result<()> {
    let json = to_string_pretty(segments)?;
    eprintln!("\n===== DEBUG [{stage}]: PROMPT SEGMENTS =====\n{json}\n");
    std::io::stderr().flush().ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_request_and_response_under_tx_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tx = Uuid::new_v4();
        let segments = vec![PromptSegment::user("hello")];

        let saved = save_stage(
            "generate",
            &segments,
            Some("Chapter 1: dawn"),
            tx,
            dir.path(),
            true,
            true,
        )
        .unwrap();

        let req = saved.request.unwrap();
        let resp = saved.response.unwrap();
        assert!(req.ends_with("generate.request.json"));
        assert!(fs::read_to_string(&req).unwrap().contains("hello"));
        assert_eq!(fs::read_to_string(&resp).unwrap(), "Chapter 1: dawn");
        assert!(saved.dir.starts_with(dir.path().join("tx")));
    }

    #[test]
    fn flags_off_save_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let saved = save_stage(
            "generate",
            &[PromptSegment::user("hello")],
            Some("text"),
            Uuid::new_v4(),
            dir.path(),
            false,
            false,
        )
        .unwrap();
        assert!(saved.request.is_none());
        assert!(saved.response.is_none());
    }
}
