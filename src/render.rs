//! SVG rendering
//!
//! Templates are a versioned interface: rendering substitutes fixed
//! placeholders and must be byte-for-byte reproducible for identical
//! aggregates, because generated artifacts are diffed across runs (and
//! across alternate implementations) to verify parity.
//!
//! Formatting contract, frozen:
//! - integers use ASCII digits with `,` thousands separators
//! - percentage labels use two decimal places (`{:.2}`)
//! - progress bar widths use three decimal places (`{:.3}`)
//! - at most the top 10 languages are shown, ordered by byte count
//!   descending then name ascending

use std::fmt::Write;

use crate::error::{Result, StatsError};
use crate::stats::AggregateStats;

/// Placeholders the overview template must contain
const OVERVIEW_PLACEHOLDERS: &[&str] = &[
    "{{ name }}",
    "{{ stars }}",
    "{{ forks }}",
    "{{ commits }}",
    "{{ lines_changed }}",
    "{{ repos }}",
];

/// Placeholders the languages template must contain
const LANGUAGES_PLACEHOLDERS: &[&str] = &["{{ progress }}", "{{ lang_list }}"];

/// Maximum languages shown on the distribution card
const MAX_LANGUAGES: usize = 10;

/// Milliseconds between language row entrance animations
const ANIMATION_DELAY_STEP_MS: usize = 150;

/// Fallback swatch for languages without a known color
const DEFAULT_LANGUAGE_COLOR: &str = "#8b949e";

/// Render the overview card
///
/// Pure and deterministic: identical inputs yield byte-identical output.
pub fn render_overview(stats: &AggregateStats, name: &str, template: &str) -> Result<String> {
    validate_template(template, OVERVIEW_PLACEHOLDERS, "overview")?;

    Ok(template
        .replace("{{ name }}", name)
        .replace("{{ stars }}", &format_number(stats.total_stars))
        .replace("{{ forks }}", &format_number(stats.total_forks))
        .replace("{{ commits }}", &format_number(stats.total_commits))
        .replace("{{ lines_changed }}", &format_number(stats.lines_changed()))
        .replace("{{ repos }}", &format_number(stats.total_repos as u64)))
}

/// Render the language distribution card
///
/// Emits one progress-bar segment per language, width proportional to its
/// byte share, plus a labeled list entry with the percentage.
pub fn render_languages(stats: &AggregateStats, template: &str) -> Result<String> {
    validate_template(template, LANGUAGES_PLACEHOLDERS, "languages")?;

    let breakdown = stats.language_breakdown();

    let mut progress = String::new();
    let mut lang_list = String::new();

    for (i, share) in breakdown.iter().take(MAX_LANGUAGES).enumerate() {
        let color = language_color(&share.name);

        write!(
            progress,
            r#"<span style="background-color: {};width: {:.3}%;" class="progress-item"></span>"#,
            color, share.percentage
        )
        .map_err(|e| StatsError::render(e.to_string()))?;

        write!(
            lang_list,
            r#"
<li style="animation-delay: {}ms;">
<svg xmlns="http://www.w3.org/2000/svg" class="octicon" style="fill:{};"
viewBox="0 0 16 16" version="1.1" width="16" height="16"><path
fill-rule="evenodd" d="M8 4a4 4 0 100 8 4 4 0 000-8z"></path></svg>
<span class="lang">{}</span>
<span class="percent">{:.2}%</span>
</li>
"#,
            i * ANIMATION_DELAY_STEP_MS,
            color,
            share.name,
            share.percentage
        )
        .map_err(|e| StatsError::render(e.to_string()))?;
    }

    Ok(template
        .replace("{{ progress }}", &progress)
        .replace("{{ lang_list }}", &lang_list))
}

/// Reject a template missing any required placeholder
///
/// A bad template surfaces here, before anything is written, so a partial
/// or corrupt artifact can never reach the output directory.
fn validate_template(template: &str, placeholders: &[&str], kind: &str) -> Result<()> {
    for placeholder in placeholders {
        if !template.contains(placeholder) {
            return Err(StatsError::render(format!(
                "{} template is missing required placeholder {}",
                kind, placeholder
            )));
        }
    }
    Ok(())
}

/// Format an integer with `,` thousands separators
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);

    for (count, ch) in digits.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }

    result.chars().rev().collect()
}

/// Swatch color for a language, matching GitHub's linguist palette for the
/// common cases
///
/// The REST languages endpoint does not return colors, so a fixed table
/// keeps the artifact deterministic without a second API round-trip.
fn language_color(language: &str) -> &'static str {
    match language {
        "Rust" => "#dea584",
        "Python" => "#3572A5",
        "JavaScript" => "#f1e05a",
        "TypeScript" => "#3178c6",
        "Go" => "#00ADD8",
        "C" => "#555555",
        "C++" => "#f34b7d",
        "C#" => "#178600",
        "Java" => "#b07219",
        "Kotlin" => "#A97BFF",
        "Swift" => "#F05138",
        "Ruby" => "#701516",
        "PHP" => "#4F5D95",
        "Shell" => "#89e051",
        "Lua" => "#000080",
        "Haskell" => "#5e5086",
        "Scala" => "#c22d40",
        "Elixir" => "#6e4a7e",
        "Dart" => "#00B4AB",
        "Zig" => "#ec915c",
        "CSS" => "#663399",
        "SCSS" => "#c6538c",
        "Vue" => "#41b883",
        "Svelte" => "#ff3e00",
        "Objective-C" => "#438eff",
        "Perl" => "#0298c3",
        "R" => "#198CE7",
        "Julia" => "#a270ba",
        "OCaml" => "#ef7a08",
        "Clojure" => "#db5855",
        "Erlang" => "#B83998",
        "Nix" => "#7e7eff",
        "Dockerfile" => "#384d54",
        "Makefile" => "#427819",
        "Vim Script" => "#199f4b",
        "Emacs Lisp" => "#c065db",
        "Jupyter Notebook" => "#DA5B0B",
        "TeX" => "#3D6117",
        "Assembly" => "#6E4C13",
        _ => DEFAULT_LANGUAGE_COLOR,
    }
}
