//! Expansion of `<NAME[:format]>` macros in output paths.
//!
//! | Macro          | Value                                             |
//! |----------------|---------------------------------------------------|
//! | `<APP>`        | file stem of the host executable                  |
//! | `<PRESET>`     | file stem of the current preset                   |
//! | `<INDEX>`      | 0-based capture index within the activation       |
//! | `<TOTALFRAME>` | capture frames of every set                       |
//! | `<MYSETFRAME>` | capture frames of the current set                 |
//! | `<TOTALTAKE>`  | activations of every set                          |
//! | `<MYSETTAKE>`  | activations of the current set                    |
//! | `<DATE>`       | capture time, `strftime` pattern as format        |
//!
//! Numeric macros take `D<n>` to zero pad to `n` digits or a bare `<n>` to space pad.
//! Unknown macros expand to nothing.

use crate::{job::FrameJob, statistics::Statistics};
use chrono::{
    format::{Item, StrftimeItems},
    DateTime, Local,
};
use std::{fmt::Write, time::SystemTime};

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H-%M-%S";
const MAX_WIDTH: usize = 32;

/// Values the macros expand to.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    /// `<APP>`.
    pub app: &'a str,
    /// `<PRESET>`.
    pub preset: &'a str,
    /// Name of the set, the scope of `<MYSET...>`.
    pub set_name: &'a str,
    /// `<INDEX>`.
    pub repeat_index: u32,
    /// `<DATE>`.
    pub frame_time: SystemTime,
    /// Source of the counter macros.
    pub statistics: &'a Statistics,
}

type Expander = fn(&str, &TemplateContext<'_>) -> String;

static MACROS: &[(&str, Expander)] = &[
    ("APP", app),
    ("PRESET", preset),
    ("INDEX", index),
    ("TOTALFRAME", total_frame),
    ("MYSETFRAME", myset_frame),
    ("TOTALTAKE", total_take),
    ("MYSETTAKE", myset_take),
    ("DATE", date),
];

/// Expands every macro in `template`.
///
/// Spans are processed once from left to right, so text produced by a macro is never
/// expanded again. A `<` without a closing `>` is kept literally.
pub fn expand(template: &str, ctx: &TemplateContext<'_>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(begin) = rest.find('<') {
        let Some(len) = rest[begin + 1..].find('>') else {
            break;
        };
        result.push_str(&rest[..begin]);

        let span = &rest[begin + 1..begin + 1 + len];
        let (name, fmt) = span.split_once(':').unwrap_or((span, ""));
        if let Some((_, expander)) = MACROS
            .iter()
            .find(|(macro_name, _)| macro_name.eq_ignore_ascii_case(name))
        {
            result.push_str(&expander(fmt, ctx));
        }

        rest = &rest[begin + len + 2..];
    }

    result.push_str(rest);
    result
}

impl<'a> TemplateContext<'a> {
    /// The context of a queued job.
    pub fn for_job(job: &'a FrameJob, app: &'a str, preset: &'a str) -> Self {
        Self {
            app,
            preset,
            set_name: &job.set.name,
            repeat_index: job.repeat_index,
            frame_time: job.frame_time,
            statistics: &job.statistics,
        }
    }
}

fn app(_: &str, ctx: &TemplateContext<'_>) -> String {
    ctx.app.to_owned()
}

fn preset(_: &str, ctx: &TemplateContext<'_>) -> String {
    ctx.preset.to_owned()
}

fn index(fmt: &str, ctx: &TemplateContext<'_>) -> String {
    number(fmt, ctx.repeat_index.into())
}

fn total_frame(fmt: &str, ctx: &TemplateContext<'_>) -> String {
    number(fmt, ctx.statistics.global().total_frame)
}

fn myset_frame(fmt: &str, ctx: &TemplateContext<'_>) -> String {
    number(fmt, ctx.statistics.scoped(ctx.set_name).total_frame)
}

fn total_take(fmt: &str, ctx: &TemplateContext<'_>) -> String {
    number(fmt, ctx.statistics.global().total_take)
}

fn myset_take(fmt: &str, ctx: &TemplateContext<'_>) -> String {
    number(fmt, ctx.statistics.scoped(ctx.set_name).total_take)
}

fn number(fmt: &str, value: u64) -> String {
    let fmt = if fmt.is_empty() { "D1" } else { fmt };
    let (zeroed, digits) = match fmt.strip_prefix(['D', 'd']) {
        Some(digits) => (true, digits),
        None => (false, fmt),
    };
    let width = digits
        .parse::<usize>()
        .ok()
        .filter(|width| *width > 0)
        .unwrap_or(1)
        .min(MAX_WIDTH);

    if zeroed {
        format!("{:0width$}", value, width = width)
    } else {
        format!("{:width$}", value, width = width)
    }
}

fn date(fmt: &str, ctx: &TemplateContext<'_>) -> String {
    let fmt = if fmt.is_empty() { DEFAULT_DATE_FORMAT } else { fmt };
    let items = StrftimeItems::new(fmt);
    if items.clone().any(|item| matches!(item, Item::Error)) {
        tracing::warn!("Invalid date format \"{}\" in output path", fmt);
        return String::new();
    }

    let time = DateTime::<Local>::from(ctx.frame_time);
    let mut out = String::new();
    match write!(out, "{}", time.format_with_items(items)) {
        Ok(()) => out,
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn with_context(f: impl FnOnce(&TemplateContext<'_>)) {
        let mut statistics = Statistics::default();
        statistics.record_take("burst");
        statistics.record_frame("burst");
        statistics.record_frame("other");
        let frame_time = Local
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .single()
            .map(SystemTime::from)
            .unwrap();

        f(&TemplateContext {
            app: "Game",
            preset: "Sharp",
            set_name: "burst",
            repeat_index: 7,
            frame_time,
            statistics: &statistics,
        });
    }

    #[test]
    fn plain_text_is_unchanged() {
        with_context(|ctx| {
            for text in ["", "shots/frame.png", "a > b", "x<y"] {
                assert_eq!(expand(text, ctx), text);
            }
        });
    }

    #[test]
    fn index_padding() {
        with_context(|ctx| {
            assert_eq!(expand("<INDEX:D3>", ctx), "007");
            assert_eq!(expand("<INDEX:3>", ctx), "  7");
            assert_eq!(expand("<INDEX>", ctx), "7");
            assert_eq!(expand("<index:d2>", ctx), "07");
        });
    }

    #[test]
    fn counters_are_scoped() {
        with_context(|ctx| {
            assert_eq!(
                expand("<TOTALFRAME>-<MYSETFRAME>-<TOTALTAKE>-<MYSETTAKE:D2>", ctx),
                "2-1-1-01"
            );
        });
    }

    #[test]
    fn names_and_date() {
        with_context(|ctx| {
            assert_eq!(
                expand("<APP>/<PRESET>/<DATE>.png", ctx),
                "Game/Sharp/2024-01-02 03-04-05.png"
            );
            assert_eq!(expand("<DATE:%Y%m%d>", ctx), "20240102");
        });
    }

    #[test]
    fn unknown_macros_vanish_and_output_is_not_rescanned() {
        with_context(|ctx| {
            assert_eq!(expand("a<NOPE>b", ctx), "ab");
            assert_eq!(expand("<APP:<INDEX>>", ctx), "Game>");
        });
        let statistics = Statistics::default();
        let ctx = TemplateContext {
            app: "<INDEX>",
            preset: "",
            set_name: "",
            repeat_index: 1,
            frame_time: SystemTime::UNIX_EPOCH,
            statistics: &statistics,
        };
        assert_eq!(expand("<APP>", &ctx), "<INDEX>");
    }
}
