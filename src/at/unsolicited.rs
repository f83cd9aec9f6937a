//! Unsolicited-notification handler registry.
//!
//! A notification line `+CRING: VOICE` is routed by its command token:
//! the leading special character is mapped to a word and the rest is kept,
//! giving the handler name `plusCRING`.  Handlers are registered under that
//! name at setup time; a lookup miss means "fall through to the generic
//! handler".

use std::collections::HashMap;

use log::debug;

/// Handler invoked with the text after the colon (trimmed) and, for
/// PDU-carrying notifications, the payload line that followed.
pub type Handler = Box<dyn FnMut(&str, Option<&str>)>;

/// Word for each prefix character.
fn prefix_word(c: char) -> Option<&'static str> {
    Some(match c {
        '+' => "plus",
        '%' => "percent",
        '@' => "at",
        '/' => "slash",
        '#' => "hash",
        '_' => "underscore",
        '*' => "star",
        '&' => "ampersand",
        '!' => "bang",
        '$' => "dollar",
        '^' => "caret",
        _ => return None,
    })
}

/// Translate a command token (`+CRING`, `% CPI`) into a handler name.
pub fn handler_name(command: &str) -> Option<String> {
    let compact: String = command.chars().filter(|c| !c.is_whitespace()).collect();
    let mut chars = compact.chars();
    let word = prefix_word(chars.next()?)?;
    let rest = chars.as_str();
    if rest.is_empty() {
        return None;
    }
    Some(format!("{word}{rest}"))
}

/// Split `+CMD: values` into `(command, values)`.
pub fn split_notification(line: &str) -> Option<(&str, &str)> {
    let (command, values) = line.split_once(':')?;
    Some((command.trim(), values.trim()))
}

/// Split a comma-separated value list, ignoring commas inside quotes.
/// Fields are trimmed and lose their surrounding quotes.
pub fn split_values(values: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in values.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                out.push(unquote(&values[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(unquote(&values[start..]));
    out
}

fn unquote(field: &str) -> &str {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}

/// Name → handler map.
#[derive(Default)]
pub struct UnsolicitedRegistry {
    handlers: HashMap<String, Handler>,
}

impl UnsolicitedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `name`, e.g. `"plusCRING"`.
    pub fn register(&mut self, name: &str, handler: impl FnMut(&str, Option<&str>) + 'static) {
        self.handlers.insert(name.to_string(), Box::new(handler));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Route a notification.  Returns `false` when the line has no
    /// `COMMAND: values` shape, the prefix is unknown, or nothing is
    /// registered under the derived name.
    pub fn dispatch(&mut self, lines: &[String]) -> bool {
        let Some(first) = lines.first() else {
            return false;
        };
        let Some((command, values)) = split_notification(first) else {
            return false;
        };
        let Some(name) = handler_name(command) else {
            return false;
        };
        match self.handlers.get_mut(&name) {
            Some(handler) => {
                debug!("unsolicited: {} '{}'", name, values);
                handler(values, lines.get(1).map(String::as_str));
                true
            }
            None => false,
        }
    }
}
