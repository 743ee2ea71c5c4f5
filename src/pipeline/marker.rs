//! Thread-comment rendering of stage records.
//!
//! A record posted to a discussion thread carries its completion marker as a
//! hidden sentinel so it can be recovered from plain text:
//!
//! ```text
//! <!-- stagegate:marker stage=plan cycle=1 -->
//! ```

use crate::pipeline::{CompletionMarker, StageName, StageOutput, StageRecord};
use anyhow::{Context, Result};
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

static MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*stagegate:marker\s+stage=([a-z]+)\s+cycle=(\d+)\s*-->").unwrap()
});

static JSON_BLOCK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*\n(.*?)\n```").unwrap());

/// The sentinel line for a marker.
pub fn sentinel(marker: &CompletionMarker) -> String {
    format!(
        "<!-- stagegate:marker stage={} cycle={} -->",
        marker.stage(),
        marker.cycle()
    )
}

/// All well-formed markers in `text`, in order of appearance.
///
/// Sentinels naming an unknown stage or an unparsable cycle are skipped.
pub fn find_markers(text: &str) -> Vec<CompletionMarker> {
    MARKER_REGEX
        .captures_iter(text)
        .filter_map(|cap| {
            let stage = StageName::from_str(cap.get(1)?.as_str()).ok()?;
            let cycle = cap.get(2)?.as_str().parse::<u32>().ok()?;
            Some(CompletionMarker::new(stage, cycle))
        })
        .collect()
}

/// Render a record as a Markdown thread comment.
pub fn render_comment(record: &StageRecord) -> Result<String> {
    let json = serde_json::to_string_pretty(&record.content)
        .context("Failed to serialize stage output")?;
    Ok(format!(
        "## Stage: {} (cycle {})\n\n```json\n{}\n```\n\n{}\n",
        record.stage,
        record.cycle,
        json,
        sentinel(&record.marker)
    ))
}

/// Recover a record from a thread comment.
///
/// Returns `Ok(None)` when the comment carries no sentinel, which is how
/// ordinary discussion comments are told apart from stage outputs.
pub fn parse_comment(text: &str) -> Result<Option<StageRecord>> {
    let markers = find_markers(text);
    let marker = match markers.as_slice() {
        [] => return Ok(None),
        [marker] => *marker,
        _ => anyhow::bail!("Comment carries {} markers, expected one", markers.len()),
    };

    let json = JSON_BLOCK_REGEX
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
        .with_context(|| format!("Comment for {} has no JSON block", marker))?;

    let content: StageOutput = serde_json::from_str(json)
        .with_context(|| format!("Failed to parse stage output for {}", marker))?;

    if content.stage() != marker.stage() {
        anyhow::bail!(
            "Marker {} wraps {} output",
            marker,
            content.stage()
        );
    }

    Ok(Some(StageRecord::new(marker.cycle(), content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DispatchOutput;

    #[test]
    fn find_markers_skips_unknown_stages() {
        let text = "intro\n<!-- stagegate:marker stage=plan cycle=1 -->\n\
                    <!-- stagegate:marker stage=deploy cycle=1 -->\n\
                    <!--stagegate:marker stage=boardroom cycle=2-->";
        let markers = find_markers(text);
        assert_eq!(
            markers,
            vec![
                CompletionMarker::new(StageName::Plan, 1),
                CompletionMarker::new(StageName::Boardroom, 2),
            ]
        );
    }

    #[test]
    fn rendered_comment_parses_back() {
        let record = StageRecord::new(
            2,
            StageOutput::Dispatch(DispatchOutput { items: vec![] }),
        );
        let comment = render_comment(&record).unwrap();
        assert!(comment.contains("## Stage: dispatch (cycle 2)"));

        let parsed = parse_comment(&comment).unwrap().unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn plain_comment_is_not_a_record() {
        assert!(parse_comment("LGTM, ship it").unwrap().is_none());
    }

    #[test]
    fn mismatched_marker_is_rejected() {
        let comment = "```json\n{\"stage\":\"dispatch\",\"output\":{\"items\":[]}}\n```\n\
                       <!-- stagegate:marker stage=plan cycle=1 -->";
        assert!(parse_comment(comment).is_err());
    }
}
