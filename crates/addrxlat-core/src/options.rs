//! The `key=value` OS-map option-string parser.
//!
//! Grammar: whitespace-separated `key` or `key=value` tokens, with `'`
//! and `"` quoting value characters (including whitespace and `=`)
//! literally. No escaping inside a quoted run other than the closing
//! quote itself.

use crate::error::AddrXlatError;

fn is_posix_space(c: char) -> bool {
    matches!(c, ' ' | '\x0c' | '\n' | '\r' | '\t' | '\x0b')
}

/// One recognized option key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptKey {
    Levels,
    Pagesize,
    PhysBase,
    RootPgt,
    XenP2mMfn,
    XenXlat,
    PteMask,
}

impl OptKey {
    const ALL: [(&'static str, OptKey); 7] = [
        ("levels", OptKey::Levels),
        ("pagesize", OptKey::Pagesize),
        ("phys_base", OptKey::PhysBase),
        ("rootpgt", OptKey::RootPgt),
        ("xen_p2m_mfn", OptKey::XenP2mMfn),
        ("xen_xlat", OptKey::XenXlat),
        ("pte_mask", OptKey::PteMask),
    ];

    fn lookup(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, k)| *k)
    }

    fn name(self) -> &'static str {
        Self::ALL.iter().find(|(_, k)| *k == self).unwrap().0
    }
}

/// A parsed full-address value, `space:value` (e.g. `KPHYSADDR:0x1000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptFullAddr {
    pub space: crate::address::AddrSpace,
    pub value: u64,
}

/// The set of options recognized from an OS-map option string, each
/// `None` until set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOpts {
    pub levels: Option<i64>,
    pub pagesize: Option<i64>,
    pub phys_base: Option<u64>,
    pub rootpgt: Option<OptFullAddr>,
    pub xen_p2m_mfn: Option<i64>,
    pub xen_xlat: Option<bool>,
    pub pte_mask: Option<u64>,
}

fn parse_bool(s: &str) -> Result<bool, ()> {
    if s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if s.eq_ignore_ascii_case("no") || s.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        parse_number(s).map(|n| n != 0)
    }
}

fn parse_number(s: &str) -> Result<i64, ()> {
    if s.is_empty() {
        return Err(());
    }
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let unsigned = parse_addr(digits)?;
    Ok(if neg { -(unsigned as i64) } else { unsigned as i64 })
}

fn parse_addr(s: &str) -> Result<u64, ()> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|_| ())
    } else if s.len() > 1 && s.starts_with('0') {
        u64::from_str_radix(&s[1..], 8).map_err(|_| ())
    } else {
        s.parse::<u64>().map_err(|_| ())
    }
}

fn parse_fulladdr(s: &str) -> Result<OptFullAddr, ()> {
    let (space_str, value_str) = s.split_once(':').ok_or(())?;
    let space = crate::address::AddrSpace::parse(space_str).ok_or(())?;
    let value = parse_addr(value_str)?;
    Ok(OptFullAddr { space, value })
}

fn apply(popt: &mut ParsedOpts, key: OptKey, val: Option<&str>) -> Result<(), AddrXlatError> {
    let bad_val = |v: &str| {
        AddrXlatError::Invalid(format!("'{v}' is not a valid value for option '{}'", key.name()))
    };
    let no_val = || AddrXlatError::Invalid(format!("missing value for option '{}'", key.name()));

    match key {
        OptKey::Levels => {
            let v = val.ok_or_else(no_val)?;
            popt.levels = Some(parse_number(v).map_err(|_| bad_val(v))?);
        }
        OptKey::Pagesize => {
            let v = val.ok_or_else(no_val)?;
            popt.pagesize = Some(parse_number(v).map_err(|_| bad_val(v))?);
        }
        OptKey::PhysBase => {
            let v = val.ok_or_else(no_val)?;
            popt.phys_base = Some(parse_addr(v).map_err(|_| bad_val(v))?);
        }
        OptKey::RootPgt => {
            let v = val.ok_or_else(no_val)?;
            popt.rootpgt = Some(parse_fulladdr(v).map_err(|_| bad_val(v))?);
        }
        OptKey::XenP2mMfn => {
            let v = val.ok_or_else(no_val)?;
            popt.xen_p2m_mfn = Some(parse_number(v).map_err(|_| bad_val(v))?);
        }
        OptKey::XenXlat => {
            popt.xen_xlat = Some(match val {
                None => true,
                Some(v) => parse_bool(v).map_err(|_| bad_val(v))?,
            });
        }
        OptKey::PteMask => {
            let v = val.ok_or_else(no_val)?;
            popt.pte_mask = Some(parse_addr(v).map_err(|_| bad_val(v))?);
        }
    }
    Ok(())
}

/// Tokenizes and parses an option string into [`ParsedOpts`].
///
/// `None` or an empty string yields all-`None` defaults. Keys not named
/// in [`OptKey`] are reported as [`AddrXlatError::NotImpl`]; a key with
/// no `=value` and no default (everything but `xen_xlat`, which defaults
/// its bare form to `true`) is [`AddrXlatError::Invalid`].
pub fn parse_opts(opts: Option<&str>) -> Result<ParsedOpts, AddrXlatError> {
    let mut popt = ParsedOpts::default();
    let Some(opts) = opts else {
        return Ok(popt);
    };

    let mut chars = opts.chars().peekable();
    while let Some(&c) = chars.peek() {
        if !is_posix_space(c) {
            break;
        }
        chars.next();
    }

    while chars.peek().is_some() {
        let mut key = String::new();
        let mut val: Option<String> = None;
        let mut quote: Option<char> = None;

        loop {
            let Some(&c) = chars.peek() else { break };
            if let Some(q) = quote {
                chars.next();
                if c == q {
                    quote = None;
                } else {
                    push_char(&mut key, &mut val, c);
                }
            } else if c == '\'' || c == '"' {
                chars.next();
                quote = Some(c);
            } else if is_posix_space(c) {
                break;
            } else if c == '=' && val.is_none() {
                chars.next();
                val = Some(String::new());
            } else {
                chars.next();
                push_char(&mut key, &mut val, c);
            }
        }

        if quote.is_some() {
            return Err(AddrXlatError::Invalid(format!(
                "unterminated {} quotes",
                if quote == Some('"') { "double" } else { "single" }
            )));
        }

        match OptKey::lookup(&key) {
            Some(k) => apply(&mut popt, k, val.as_deref())?,
            None => return Err(AddrXlatError::NotImpl(format!("unknown option: {key}"))),
        }

        while let Some(&c) = chars.peek() {
            if !is_posix_space(c) {
                break;
            }
            chars.next();
        }
    }

    Ok(popt)
}

fn push_char(key: &mut String, val: &mut Option<String>, c: char) {
    match val {
        Some(v) => v.push(c),
        None => key.push(c),
    }
}

impl ParsedOpts {
    /// Renders this bundle back into an option string `parse_opts` accepts,
    /// quoting any `rootpgt` value (the only one that can contain `:`,
    /// which is otherwise unambiguous but kept quoted for readability).
    ///
    /// `parse_opts(Some(&popt.format())) == Ok(popt)` for any bundle built
    /// entirely from `parse_opts`, since every field this parser recognizes
    /// is format-then-parse round-trippable.
    pub fn format(&self) -> String {
        let mut out = Vec::new();
        if let Some(v) = self.levels {
            out.push(format!("levels={v}"));
        }
        if let Some(v) = self.pagesize {
            out.push(format!("pagesize=0x{v:x}"));
        }
        if let Some(v) = self.phys_base {
            out.push(format!("phys_base=0x{v:x}"));
        }
        if let Some(v) = self.rootpgt {
            out.push(format!("rootpgt='{}:0x{:x}'", v.space.name(), v.value));
        }
        if let Some(v) = self.xen_p2m_mfn {
            out.push(format!("xen_p2m_mfn={v}"));
        }
        if let Some(v) = self.xen_xlat {
            out.push(format!("xen_xlat={}", if v { "yes" } else { "no" }));
        }
        if let Some(v) = self.pte_mask {
            out.push(format!("pte_mask=0x{v:x}"));
        }
        out.join(" ")
    }
}
