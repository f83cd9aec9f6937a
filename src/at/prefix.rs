//! Response-prefix derivation.
//!
//! A command such as `+CPIN?` is answered with `+CPIN: READY`; the set of
//! prefixes a command may legitimately see in its response is the set of
//! AT prefix tokens (`[+%!*$^_&][A-Z]+`) in its own text.

use std::collections::HashMap;
use std::rc::Rc;

/// Characters that open an AT prefix token.
const TOKEN_OPENERS: &[char] = &['+', '%', '!', '*', '$', '^', '_', '&'];

/// Shared, immutable prefix set.
pub type PrefixSet = Rc<[String]>;

/// Extract every distinct prefix token from `text`, in first-seen order.
pub fn derive_prefixes(text: &str) -> Vec<String> {
    let body = text.strip_prefix("AT").unwrap_or(text);
    let mut out: Vec<String> = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if !TOKEN_OPENERS.contains(&c) {
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(i, n)) = chars.peek() {
            if !n.is_ascii_uppercase() {
                break;
            }
            end = i + 1;
            chars.next();
        }
        if end > start + c.len_utf8() {
            let token = &body[start..end];
            if !out.iter().any(|t| t == token) {
                out.push(token.to_string());
            }
        }
    }
    out
}

/// Memoizes [`derive_prefixes`] per distinct command text.
#[derive(Debug, Default)]
pub struct PrefixCache {
    entries: HashMap<String, PrefixSet>,
}

impl PrefixCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, text: &str) -> PrefixSet {
        if let Some(set) = self.entries.get(text) {
            return Rc::clone(set);
        }
        let set: PrefixSet = derive_prefixes(text).into();
        self.entries.insert(text.to_string(), Rc::clone(&set));
        set
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
