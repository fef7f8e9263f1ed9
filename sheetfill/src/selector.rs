use std::collections::BTreeMap;
use std::fmt;

/// A single compound selector: optional tag, classes, attribute constraints
/// and an optional `:nth-child` position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Compound {
    pub tag: Option<String>,
    pub classes: Vec<String>,
    /// Attribute name to required value. `None` means presence only.
    pub attributes: BTreeMap<String, Option<String>>,
    /// 1-based position among the parent's element children.
    pub nth_child: Option<usize>,
}

/// Represents ways to locate a page element
///
/// This is the CSS subset the target form needs. `Display` renders it back to
/// CSS so engines backed by a live page can hand it to `querySelectorAll`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// `tag.class[attr="value"]:nth-child(n)`
    Compound(Compound),
    /// `parent > child`
    Child {
        parent: Box<Selector>,
        child: Compound,
    },
    /// `a, b, c`
    Any(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    pub fn role(role: &str) -> Self {
        Selector::Compound(Compound {
            attributes: BTreeMap::from([("role".to_string(), Some(role.to_string()))]),
            ..Default::default()
        })
    }

    pub fn class(class: &str) -> Self {
        Selector::Compound(Compound {
            classes: vec![class.to_string()],
            ..Default::default()
        })
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Selector::Invalid(_) => false,
            Selector::Any(parts) => parts.iter().all(Selector::is_valid),
            Selector::Child { parent, .. } => parent.is_valid(),
            Selector::Compound(_) => true,
        }
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            write!(f, "{tag}")?;
        }
        for class in &self.classes {
            write!(f, ".{class}")?;
        }
        for (name, value) in &self.attributes {
            match value {
                Some(value) => {
                    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, "[{name}=\"{escaped}\"]")?
                }
                None => write!(f, "[{name}]")?,
            }
        }
        if let Some(n) = self.nth_child {
            write!(f, ":nth-child({n})")?;
        }
        Ok(())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Compound(c) => write!(f, "{c}"),
            Selector::Child { parent, child } => write!(f, "{parent} > {child}"),
            Selector::Any(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", rendered.join(", "))
            }
            Selector::Invalid(reason) => write!(f, "<invalid: {reason}>"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Selector::Invalid("empty selector".to_string());
        }

        // Selector lists first
        let list = split_top_level(s, ',');
        if list.len() > 1 {
            let parts: Vec<Selector> = list.into_iter().map(Selector::from).collect();
            if let Some(Selector::Invalid(reason)) = parts.iter().find(|p| !p.is_valid()) {
                return Selector::Invalid(reason.clone());
            }
            return Selector::Any(parts);
        }

        // Child combinators, left-associative
        let mut chain = split_top_level(s, '>').into_iter().map(str::trim);
        let first = match chain.next().map(parse_compound) {
            Some(Ok(c)) => Selector::Compound(c),
            Some(Err(reason)) => return Selector::Invalid(reason),
            None => return Selector::Invalid(format!("Unknown selector format: \"{s}\"")),
        };
        let mut selector = first;
        for part in chain {
            match parse_compound(part) {
                Ok(child) => {
                    selector = Selector::Child {
                        parent: Box::new(selector),
                        child,
                    }
                }
                Err(reason) => return Selector::Invalid(reason),
            }
        }
        selector
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

/// Split on `sep` where it appears outside attribute brackets and quotes
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                _ if c == sep && depth == 0 => {
                    parts.push(&s[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Index of the `]` closing the bracket at `open`, skipping quoted text
fn closing_bracket(chars: &[char], open: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut i = open + 1;
    while i < chars.len() {
        match (quote, chars[i]) {
            (Some(_), '\\') => i += 1,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, c @ ('"' | '\'')) => quote = Some(c),
            (None, ']') => return Some(i),
            (None, _) => {}
        }
        i += 1;
    }
    None
}

fn unquote(value: &str) -> String {
    let inner = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    let Some(inner) = inner else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(s: &str) -> Result<Compound, String> {
    if s.is_empty() {
        return Err("empty compound selector".to_string());
    }
    if s.contains(char::is_whitespace) && !s.contains('[') {
        return Err(format!(
            "Descendant combinators are not supported: \"{s}\". Use '>' for direct children."
        ));
    }

    let mut compound = Compound::default();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;

    let take_ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    if chars[0] == '*' {
        i += 1;
    } else if is_ident_char(chars[0]) {
        compound.tag = Some(take_ident(&mut i).to_lowercase());
    }

    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                let class = take_ident(&mut i);
                if class.is_empty() {
                    return Err(format!("Empty class name in \"{s}\""));
                }
                compound.classes.push(class);
            }
            '[' => {
                let close = closing_bracket(&chars, i)
                    .ok_or_else(|| format!("Unclosed attribute selector in \"{s}\""))?;
                let inner: String = chars[i + 1..close].iter().collect();
                let (name, value) = match inner.split_once('=') {
                    Some((name, value)) => (name.trim().to_string(), Some(unquote(value.trim()))),
                    None => (inner.trim().to_string(), None),
                };
                if name.is_empty() || !name.chars().all(is_ident_char) {
                    return Err(format!("Invalid attribute name in \"{s}\""));
                }
                compound.attributes.insert(name, value);
                i = close + 1;
            }
            ':' => {
                let rest: String = chars[i..].iter().collect();
                let arg = rest
                    .strip_prefix(":nth-child(")
                    .and_then(|r| r.split_once(')'))
                    .ok_or_else(|| format!("Unsupported pseudo-class in \"{s}\""))?;
                let n = arg
                    .0
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("Invalid index for nth-child: '{}'", arg.0))?;
                compound.nth_child = Some(n);
                i += ":nth-child(".len() + arg.0.len() + 1;
            }
            other => return Err(format!("Unexpected '{other}' in selector \"{s}\"")),
        }
    }

    Ok(compound)
}

impl serde::Serialize for Selector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Selector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match Selector::from(raw.as_str()) {
            Selector::Invalid(reason) => Err(serde::de::Error::custom(reason)),
            selector => Ok(selector),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attribute_with_tag() {
        let selector = Selector::from(r#"input[placeholder="Enter Full name"]"#);
        let Selector::Compound(c) = &selector else {
            panic!("expected compound, got {selector:?}");
        };
        assert_eq!(c.tag.as_deref(), Some("input"));
        assert_eq!(
            c.attributes.get("placeholder"),
            Some(&Some("Enter Full name".to_string()))
        );
    }

    #[test]
    fn parses_multiple_attributes_and_nth_child() {
        let selector = Selector::from(r#"div[role="combobox"]:nth-child(2)"#);
        let Selector::Compound(c) = selector else {
            panic!("expected compound");
        };
        assert_eq!(c.nth_child, Some(2));
        assert_eq!(c.attributes.len(), 1);

        let selector = Selector::from(r#"div[role="combobox"][tabindex="0"]"#);
        let Selector::Compound(c) = selector else {
            panic!("expected compound");
        };
        assert_eq!(c.attributes.get("tabindex"), Some(&Some("0".to_string())));
    }

    #[test]
    fn parses_child_and_list() {
        let child = Selector::from(r#"ul[role="listbox"] > li"#);
        assert!(matches!(child, Selector::Child { .. }));
        assert_eq!(child.to_string(), r#"ul[role="listbox"] > li"#);

        let list = Selector::from("input, textarea, select");
        match list {
            Selector::Any(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn presence_attribute_and_class() {
        let s = Selector::from("[aria-haspopup]");
        assert_eq!(s.to_string(), "[aria-haspopup]");
        let s = Selector::from(".MuiList-root > li");
        assert_eq!(s.to_string(), ".MuiList-root > li");
    }

    #[test]
    fn rejects_garbage() {
        assert!(!Selector::from("div li").is_valid());
        assert!(!Selector::from("li:hover").is_valid());
        assert!(!Selector::from("[role=\"x\"").is_valid());
        assert!(!Selector::from("li:nth-child(0)").is_valid());
        assert!(!Selector::from("a, ").is_valid());
    }

    #[test]
    fn commas_and_quotes_inside_values() {
        let s = Selector::from(r#"input[placeholder="Last, First"]"#);
        let Selector::Compound(c) = &s else {
            panic!("expected compound, got {s:?}");
        };
        assert_eq!(c.attributes.get("placeholder"), Some(&Some("Last, First".to_string())));

        let list = Selector::from(r#"input[placeholder="a, b"], li[title='x > y']"#);
        assert!(matches!(&list, Selector::Any(parts) if parts.len() == 2), "{list:?}");

        let quoted = Selector::from(r#"input[placeholder="Say \"hi\" [now]"]"#);
        let Selector::Compound(c) = &quoted else {
            panic!("expected compound, got {quoted:?}");
        };
        assert_eq!(c.attributes.get("placeholder"), Some(&Some(r#"Say "hi" [now]"#.to_string())));
        assert_eq!(Selector::from(quoted.to_string()), quoted);
    }

    #[test]
    fn serde_uses_css_text() {
        let s: Selector = serde_json::from_str(r#""[role=\"option\"]""#).unwrap();
        assert_eq!(s, Selector::role("option"));
        assert!(serde_json::from_str::<Selector>(r#""a b""#).is_err());
    }
}
