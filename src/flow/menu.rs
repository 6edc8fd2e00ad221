//! Menu options, outbound reply shapes, and selection matching.

use serde::Serialize;

/// One selectable option in a menu or button row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MenuOption {
    /// Structured selection id returned by rich transports.
    pub id: &'static str,
    pub label: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'static str,
    /// Extra free-text spellings accepted for this option.
    #[serde(skip)]
    pub aliases: &'static [&'static str],
}

/// A reply produced by the conversation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// A list menu (rendered as an option list when the transport supports it).
    Menu {
        prompt: String,
        options: Vec<MenuOption>,
    },
    /// A short row of buttons.
    Buttons {
        prompt: String,
        buttons: Vec<MenuOption>,
    },
}

impl Outbound {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// The prompt or text body.
    pub fn body(&self) -> &str {
        match self {
            Self::Text(t) => t,
            Self::Menu { prompt, .. } | Self::Buttons { prompt, .. } => prompt,
        }
    }

    /// Prepend a line to the prompt, keeping the reply's shape.
    pub fn with_prefix(self, prefix: &str) -> Self {
        match self {
            Self::Text(t) => Self::Text(format!("{prefix}\n\n{t}")),
            Self::Menu { prompt, options } => Self::Menu {
                prompt: format!("{prefix}\n\n{prompt}"),
                options,
            },
            Self::Buttons { prompt, buttons } => Self::Buttons {
                prompt: format!("{prefix}\n\n{prompt}"),
                buttons,
            },
        }
    }

    /// Plain-text rendering for transports without rich menus.
    pub fn to_plain_text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Menu { prompt, options } => render_numbered(prompt, options),
            Self::Buttons { prompt, buttons } => render_numbered(prompt, buttons),
        }
    }
}

/// Render a prompt followed by a 1-based numbered option list.
pub fn render_numbered(prompt: &str, options: &[MenuOption]) -> String {
    let mut out = String::from(prompt);
    out.push('\n');
    for (i, option) in options.iter().enumerate() {
        out.push_str(&format!("\n{}. {}", i + 1, option.label));
        if !option.description.is_empty() {
            out.push_str(&format!(" - {}", option.description));
        }
    }
    out
}

/// Lowercase, trim, and strip Portuguese diacritics.
pub fn normalize(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Find the option selected by `input`.
///
/// Accepts the option id, its label, or an alias, compared after
/// [`normalize`]. With `numeric` set, `1..=N` selects by position.
pub fn match_option<'a>(
    input: &str,
    options: &'a [MenuOption],
    numeric: bool,
) -> Option<&'a MenuOption> {
    let needle = normalize(input);
    if needle.is_empty() {
        return None;
    }

    if numeric {
        if let Ok(n) = needle.parse::<usize>() {
            return n.checked_sub(1).and_then(|i| options.get(i));
        }
    }

    options.iter().find(|option| {
        normalize(option.id) == needle
            || normalize(option.label) == needle
            || option.aliases.iter().any(|a| normalize(a) == needle)
    })
}
