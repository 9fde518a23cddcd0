//! Stylesheet task: SCSS entry to CSS artifacts
//!
//! An ordered pipeline of pure stages over in-memory buffers, with the
//! filesystem touched only at the read and write boundaries:
//!
//! 1. compile the SCSS entry with `grass`;
//! 2. parse with `lightningcss` and apply browserslist-targeted transforms
//!    (vendor prefixing per the configured support range);
//! 3. consolidate `@media` rules: merge identical queries, move them after
//!    all other top-level rules, sort mobile-first;
//! 4. print the unminified CSS with a source map, then the minified CSS.
//!
//! The task writes `<stem>.css`, `<stem>.css.map` and `<stem>.min.css` to
//! the build stylesheet directory and pushes a CSS update to any connected
//! live-reload clients.

use std::path::Path;

use lightningcss::printer::PrinterOptions;
use lightningcss::rules::media::MediaRule;
use lightningcss::rules::CssRule;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use lightningcss::traits::ToCss;
use once_cell::sync::Lazy;
use parcel_sourcemap::SourceMap;
use regex::Regex;

use crate::error::{PipelineError, Result};
use crate::reload::ReloadEvent;
use crate::tasks::{TaskContext, TaskOutput};

const TASK: &str = "styles";

/// The three buffers the postprocess stage hands back
#[derive(Debug)]
struct Postprocessed {
    css: String,
    map: String,
    min: String,
}

pub async fn run(ctx: &TaskContext) -> Result<TaskOutput> {
    let config = &ctx.config;
    let entry = config.styles_entry();

    let source = tokio::fs::read_to_string(&entry).await.map_err(|e| {
        PipelineError::stage(TASK, "fs", format!("{}: {}", entry.display(), e))
    })?;

    let compiled = compile(&source, entry.parent())?;
    let browsers = resolve_browsers(&config.styles.browsers)?;

    let stem = entry
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("style")
        .to_string();
    let map_name = format!("{stem}.css.map");
    let entry_name = entry.display().to_string();

    let out = postprocess(&compiled, browsers, &entry_name, &map_name)?;

    let dest = config.styles_dest();
    tokio::fs::create_dir_all(&dest)
        .await
        .map_err(|e| PipelineError::stage(TASK, "fs", e))?;

    let css_path = dest.join(format!("{stem}.css"));
    let map_path = dest.join(&map_name);
    let min_path = dest.join(format!("{stem}.min.css"));

    tokio::fs::write(&css_path, &out.css)
        .await
        .map_err(|e| PipelineError::stage(TASK, "fs", e))?;
    tokio::fs::write(&map_path, &out.map)
        .await
        .map_err(|e| PipelineError::stage(TASK, "fs", e))?;

    // Stream the fresh stylesheet to connected clients before the minified
    // sibling is produced, the way the original pushed mid-pipeline.
    if let Some(hub) = &ctx.reload {
        hub.send(ReloadEvent::CssUpdate);
    }

    tokio::fs::write(&min_path, &out.min)
        .await
        .map_err(|e| PipelineError::stage(TASK, "fs", e))?;

    Ok(TaskOutput::new(
        vec![css_path, map_path, min_path],
        format!("{stem}.css + map + min"),
    ))
}

/// Compile SCSS to expanded CSS; imports resolve relative to the entry dir
fn compile(source: &str, load_path: Option<&Path>) -> Result<String> {
    let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
    if let Some(dir) = load_path {
        options = options.load_path(dir);
    }

    grass::from_string(source.to_string(), &options)
        .map_err(|e| PipelineError::stage(TASK, "grass", e))
}

/// Resolve browserslist queries into concrete browser versions
fn resolve_browsers(queries: &[String]) -> Result<Option<Browsers>> {
    Browsers::from_browserslist(queries.iter().map(|s| s.as_str()))
        .map_err(|e| PipelineError::stage(TASK, "browserslist", e))
}

/// Prefix, pack media queries, and print both artifacts plus the source map
fn postprocess(
    css: &str,
    browsers: Option<Browsers>,
    entry_name: &str,
    map_name: &str,
) -> Result<Postprocessed> {
    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: entry_name.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| PipelineError::stage(TASK, "lightningcss", e))?;

    let targets = Targets {
        browsers,
        ..Targets::default()
    };

    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| PipelineError::stage(TASK, "lightningcss", e))?;

    pack_media_queries(&mut sheet);

    let mut source_map = SourceMap::new("/");
    let printed = sheet
        .to_css(PrinterOptions {
            source_map: Some(&mut source_map),
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| PipelineError::stage(TASK, "lightningcss", e))?;

    let map = source_map
        .to_json(None)
        .map_err(|e| PipelineError::stage(TASK, "sourcemap", e))?;

    let css_out = format!("{}\n/*# sourceMappingURL={} */\n", printed.code, map_name);

    let min = sheet
        .to_css(PrinterOptions {
            minify: true,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| PipelineError::stage(TASK, "lightningcss", e))?
        .code;

    Ok(Postprocessed {
        css: css_out,
        map,
        min,
    })
}

/// Merge `@media` rules with identical queries, move them after all other
/// top-level rules, and sort them ascending by `min-width` then query text.
fn pack_media_queries<'i>(sheet: &mut StyleSheet<'i>) {
    let rules = std::mem::take(&mut sheet.rules.0);
    let mut others = Vec::new();
    let mut media: Vec<(String, MediaRule<'i>)> = Vec::new();

    for rule in rules {
        match rule {
            CssRule::Media(m) => {
                let key = m
                    .query
                    .to_css_string(PrinterOptions::default())
                    .unwrap_or_default();
                if let Some((_, existing)) = media.iter_mut().find(|(k, _)| *k == key) {
                    existing.rules.0.extend(m.rules.0);
                } else {
                    media.push((key, m));
                }
            }
            other => others.push(other),
        }
    }

    media.sort_by(|a, b| media_sort_key(&a.0).cmp(&media_sort_key(&b.0)));
    others.extend(media.into_iter().map(|(_, m)| CssRule::Media(m)));
    sheet.rules.0 = others;
}

/// Sort key: `min-width` in thousandths of a pixel (em/rem scaled at 16px),
/// then the query text. Queries without a min-width sort first.
fn media_sort_key(query: &str) -> (u64, String) {
    static MIN_WIDTH: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"min-width:\s*([0-9.]+)(px|em|rem)?").expect("valid regex"));

    let width = MIN_WIDTH
        .captures(query)
        .and_then(|c| {
            let n: f64 = c[1].parse().ok()?;
            let scale = match c.get(2).map(|m| m.as_str()) {
                Some("em") | Some("rem") => 16.0,
                _ => 1.0,
            };
            Some((n * scale * 1000.0) as u64)
        })
        .unwrap_or(0);

    (width, query.to_string())
}
