//! vCard reading and writing.
//!
//! Reading accepts vCard 2.1, 3.0 and 4.0 text and keeps only the columns
//! the table knows about (FN, TEL with its TYPE tags, EMAIL). Writing comes
//! in two flavors, see [`ExportVariant`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};
use crate::record::{Record, RecordSet, LIST_SEPARATOR};

const BEGIN_VCARD: &str = "BEGIN:VCARD";
const END_VCARD: &str = "END:VCARD";

/// Longest physical line (in octets, excluding CRLF) in standard output.
const FOLD_WIDTH: usize = 75;

/// Output flavor for [`save`] and [`serialize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportVariant {
    /// vCard 3.0 with escaping, folding and phone types preserved.
    #[default]
    Standard,
    /// Layout for strict importers (iOS Contacts): structured `N` line,
    /// every phone tagged `type=pref`, blank line between cards and no
    /// escaping at all. Values containing `;`, `,`, `:` or newlines produce
    /// broken output.
    #[serde(alias = "compat", alias = "ios")]
    Compatible,
}

// =============================================================================
// Reading
// =============================================================================

/// Read a vCard file into a record set.
pub fn load(path: &Path) -> Result<RecordSet> {
    let bytes = fs::read(path).map_err(|err| Error::io("reading vCard file", path, err))?;
    let input = String::from_utf8(bytes).map_err(|err| {
        Error::io(
            "reading vCard file",
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        )
    })?;

    let records = parse_named(&input, &path.display().to_string())?;
    tracing::debug!(path = %path.display(), records = records.len(), "loaded vCard file");
    Ok(records)
}

/// Parse vCard text into records.
pub fn parse_str(input: &str) -> Result<RecordSet> {
    parse_named(input, "<input>")
}

fn parse_named(input: &str, origin: &str) -> Result<RecordSet> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let blocks = split_cards(input, origin)?;
    Ok(blocks.iter().map(|block| record_from_card(&block.lines)).collect())
}

struct CardBlock {
    start_line: usize,
    lines: Vec<String>,
}

fn split_cards(content: &str, origin: &str) -> Result<Vec<CardBlock>> {
    let mut cards: Vec<CardBlock> = Vec::new();
    let mut current: Option<CardBlock> = None;

    let parse_error = |line: usize, message: &str| Error::Parse {
        origin: origin.to_string(),
        line,
        message: message.to_string(),
    };

    for (idx, raw_line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end_matches('\r');
        let marker = line.trim_end();

        if marker.eq_ignore_ascii_case(BEGIN_VCARD) {
            if let Some(open) = &current {
                return Err(parse_error(
                    open.start_line,
                    "BEGIN:VCARD is not terminated before the next BEGIN:VCARD",
                ));
            }
            current = Some(CardBlock {
                start_line: line_no,
                lines: Vec::new(),
            });
            continue;
        }

        if marker.eq_ignore_ascii_case(END_VCARD) {
            match current.take() {
                Some(block) => cards.push(block),
                None => {
                    return Err(parse_error(line_no, "END:VCARD without a matching BEGIN:VCARD"))
                }
            }
            continue;
        }

        match current.as_mut() {
            Some(block) => block.lines.push(line.to_string()),
            None if !marker.is_empty() => {
                tracing::debug!(line = line_no, "ignoring text outside of a vCard");
            }
            None => {}
        }
    }

    if let Some(open) = current {
        return Err(parse_error(open.start_line, "BEGIN:VCARD is never terminated"));
    }

    Ok(cards)
}

fn record_from_card(lines: &[String]) -> Record {
    let mut record = Record::default();
    let mut has_name = false;
    let mut phones: Vec<String> = Vec::new();
    let mut types: Vec<String> = Vec::new();
    let mut emails: Vec<String> = Vec::new();

    for line in unfold_lines(lines) {
        let Some(prop) = parse_property(&line) else {
            if !line.trim().is_empty() {
                tracing::debug!(line = %line, "skipping vCard line without a value");
            }
            continue;
        };

        match prop.name.as_str() {
            "FN" if !has_name => {
                record.name = prop.value;
                has_name = true;
            }
            "TEL" => {
                let number = strip_tel_scheme(prop.value.trim());
                phones.push(number.to_string());
                types.push(prop.types.join(","));
            }
            "EMAIL" => emails.push(prop.value.trim().to_string()),
            _ => {}
        }
    }

    record.phone = phones.join(LIST_SEPARATOR);
    record.types = types.join(LIST_SEPARATOR);
    record.email = emails.join(LIST_SEPARATOR);
    record
}

fn unfold_lines(lines: &[String]) -> Vec<String> {
    let mut unfolded: Vec<String> = Vec::new();
    for line in lines {
        let mut handled = false;
        if let Some(last) = unfolded.last_mut() {
            if line.starts_with(' ') || line.starts_with('\t') {
                if last.ends_with('=') && has_quoted_printable_encoding(last) {
                    last.pop();
                    last.push_str(line.trim_start_matches([' ', '\t']));
                } else {
                    // Folding inserts exactly one whitespace character.
                    last.push_str(&line[1..]);
                }
                handled = true;
            } else if last.ends_with('=') && has_quoted_printable_encoding(last) {
                last.pop();
                last.push_str(line);
                handled = true;
            }
        }

        if !handled {
            unfolded.push(line.clone());
        }
    }
    unfolded
}

fn has_quoted_printable_encoding(line: &str) -> bool {
    let Some((prefix, _)) = split_property_line(line) else {
        return false;
    };
    split_unquoted(prefix, ';').into_iter().skip(1).any(|part| {
        let trimmed = part.trim();
        match trimmed.split_once('=') {
            Some((name, value)) => {
                name.trim().eq_ignore_ascii_case("ENCODING")
                    && value.trim().eq_ignore_ascii_case("QUOTED-PRINTABLE")
            }
            None => trimmed.eq_ignore_ascii_case("QUOTED-PRINTABLE"),
        }
    })
}

struct Property {
    name: String,
    types: Vec<String>,
    value: String,
}

fn parse_property(line: &str) -> Option<Property> {
    let (lhs, raw_value) = split_property_line(line)?;
    let mut parts = split_unquoted(lhs, ';').into_iter();
    let (_, name) = split_group(parts.next()?.trim());
    if name.is_empty() {
        return None;
    }

    let params = parse_parameters(parts);
    let decoded = if params.quoted_printable {
        match decode_quoted_printable(raw_value) {
            Ok(decoded) => decoded,
            Err(message) => {
                tracing::warn!(property = name, %message, "keeping undecoded value");
                raw_value.to_string()
            }
        }
    } else {
        raw_value.to_string()
    };

    Some(Property {
        name: name.to_ascii_uppercase(),
        types: params.types,
        value: unescape_text(&decoded),
    })
}

/// Split `NAME;PARAMS:value` at the first colon that is not inside a quoted
/// parameter value.
fn split_property_line(line: &str) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => return Some((&line[..idx], &line[idx + 1..])),
            _ => {}
        }
    }
    None
}

fn split_unquoted(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in input.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == sep && !in_quotes {
            parts.push(&input[start..idx]);
            start = idx + ch.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

fn split_group(property: &str) -> (Option<&str>, &str) {
    match property.find('.') {
        Some(pos) => (Some(&property[..pos]), &property[pos + 1..]),
        None => (None, property),
    }
}

#[derive(Default)]
struct ParsedParameters {
    types: Vec<String>,
    quoted_printable: bool,
}

fn parse_parameters<'a>(raw_params: impl Iterator<Item = &'a str>) -> ParsedParameters {
    let mut parsed = ParsedParameters::default();

    for param in raw_params {
        let trimmed = param.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some((name, value)) = trimmed.split_once('=') {
            handle_named_parameter(name, value, &mut parsed);
        } else {
            handle_positional_parameter(trimmed, &mut parsed);
        }
    }

    parsed
}

fn handle_named_parameter(name: &str, value: &str, parsed: &mut ParsedParameters) {
    match name.trim().to_ascii_uppercase().as_str() {
        "TYPE" => {
            for part in split_unquoted(value, ',') {
                let item = clean_quotes(part);
                if !item.is_empty() {
                    parsed.types.push(item);
                }
            }
        }
        "ENCODING" => {
            if value.trim().eq_ignore_ascii_case("QUOTED-PRINTABLE") {
                parsed.quoted_printable = true;
            }
        }
        // CHARSET, PREF, VALUE, LABEL and the rest carry nothing the table shows.
        _ => {}
    }
}

fn handle_positional_parameter(param: &str, parsed: &mut ParsedParameters) {
    if param.eq_ignore_ascii_case("QUOTED-PRINTABLE") {
        parsed.quoted_printable = true;
    } else if param.eq_ignore_ascii_case("BASE64") || param.eq_ignore_ascii_case("8BIT") {
        // transfer encodings, not types
    } else {
        // vCard 2.1 writes bare types: TEL;CELL;VOICE:...
        parsed.types.push(param.to_string());
    }
}

fn clean_quotes(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

fn decode_quoted_printable(input: &str) -> std::result::Result<String, String> {
    let bytes_in = input.as_bytes();
    let mut bytes: Vec<u8> = Vec::with_capacity(bytes_in.len());
    let mut i = 0usize;

    while i < bytes_in.len() {
        if bytes_in[i] != b'=' {
            bytes.push(bytes_in[i]);
            i += 1;
            continue;
        }
        if i + 1 >= bytes_in.len() {
            // trailing soft line break
            break;
        }
        if i + 2 >= bytes_in.len() {
            return Err("truncated quoted-printable escape".to_string());
        }
        let (a, b) = (bytes_in[i + 1] as char, bytes_in[i + 2] as char);
        let value = decode_hex_pair(a, b)
            .ok_or_else(|| format!("invalid quoted-printable escape: ={a}{b}"))?;
        bytes.push(value);
        i += 3;
    }

    String::from_utf8(bytes).map_err(|err| format!("invalid UTF-8 in quoted-printable: {err}"))
}

fn decode_hex_pair(a: char, b: char) -> Option<u8> {
    let high = a.to_digit(16)?;
    let low = b.to_digit(16)?;
    Some(((high << 4) | low) as u8)
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(c @ ('\\' | ',' | ';' | ':')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn has_tel_scheme(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() >= 4 && bytes[..3].eq_ignore_ascii_case(b"tel") && bytes[3] == b':'
}

fn strip_tel_scheme(value: &str) -> &str {
    if has_tel_scheme(value) {
        value[4..].trim()
    } else {
        value
    }
}

// =============================================================================
// Writing
// =============================================================================

/// Structured name parts as written to the `N` property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameParts {
    pub surname: String,
    pub given: String,
    pub middle: String,
    pub prefix: String,
}

/// Split a display name into `N` components: the last word is the surname,
/// the first the given name, anything between is the middle name.
pub fn split_name(name: &str) -> NameParts {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [] => NameParts::default(),
        [only] => NameParts {
            surname: only.to_string(),
            ..NameParts::default()
        },
        [given, surname] => NameParts {
            surname: surname.to_string(),
            given: given.to_string(),
            ..NameParts::default()
        },
        [given, middle @ .., surname] => NameParts {
            surname: surname.to_string(),
            given: given.to_string(),
            middle: middle.join(" "),
            prefix: String::new(),
        },
    }
}

pub fn serialize(records: &RecordSet, variant: ExportVariant) -> String {
    match variant {
        ExportVariant::Standard => serialize_standard(records),
        ExportVariant::Compatible => serialize_compatible(records),
    }
}

pub fn serialize_standard(records: &RecordSet) -> String {
    let mut output = String::new();
    for record in records {
        let mut lines: Vec<String> = vec![BEGIN_VCARD.to_string(), "VERSION:3.0".to_string()];

        let name = nfc(&record.name);
        if !name.is_empty() {
            lines.push(format!("FN:{}", escape_vcard_value(&name)));
        }

        for (phone, kind) in record.phones_with_types() {
            let phone = nfc(phone.trim());
            if phone.is_empty() {
                continue;
            }
            let kind = nfc(kind.trim());
            let params = if kind.is_empty() {
                String::new()
            } else {
                let values: Vec<String> = kind.split(',').map(format_param_value).collect();
                format!(";TYPE={}", values.join(","))
            };
            lines.push(format!("TEL{}:{}", params, escape_vcard_value(&phone)));
        }

        for email in record.emails() {
            let email = nfc(email.trim());
            if !email.is_empty() {
                lines.push(format!("EMAIL:{}", escape_vcard_value(&email)));
            }
        }

        lines.push(END_VCARD.to_string());
        for line in lines {
            output.push_str(&fold_line(&line));
            output.push_str("\r\n");
        }
    }
    output
}

pub fn serialize_compatible(records: &RecordSet) -> String {
    let mut output = String::new();
    for record in records {
        output.push_str(BEGIN_VCARD);
        output.push('\n');

        let name = nfc(&record.name);
        let parts = split_name(&name);
        output.push_str(&format!(
            "N:{};{};{};{};\n",
            parts.surname, parts.given, parts.middle, parts.prefix
        ));
        output.push_str(&format!("FN:{name}\n"));

        for (phone, _) in record.phones_with_types() {
            let phone = phone.trim();
            if !phone.is_empty() {
                output.push_str(&format!("TEL;type=pref:{phone}\n"));
            }
        }

        for email in record.emails() {
            let email = email.trim();
            if !email.is_empty() {
                output.push_str(&format!("EMAIL:{email}\n"));
            }
        }

        output.push_str(END_VCARD);
        output.push_str("\n\n");
    }
    output
}

fn nfc(value: &str) -> String {
    value.nfc().collect()
}

fn escape_vcard_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(';', "\\;")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

fn format_param_value(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.contains(';') || trimmed.contains(':') {
        format!("\"{}\"", trimmed.replace('"', "'"))
    } else {
        trimmed.to_string()
    }
}

/// Fold a content line at [`FOLD_WIDTH`] octets without splitting a UTF-8
/// sequence. Continuation lines start with a single space.
fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_WIDTH {
        return line.to_string();
    }

    let mut folded = String::with_capacity(line.len() + line.len() / FOLD_WIDTH * 3);
    let mut width = 0usize;
    let mut limit = FOLD_WIDTH;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > limit {
            folded.push_str("\r\n ");
            width = 0;
            // the leading space counts towards the continuation line
            limit = FOLD_WIDTH - 1;
        }
        folded.push(ch);
        width += len;
    }
    folded
}

/// Serialize and write records, replacing `path` atomically.
pub fn save(records: &RecordSet, path: &Path, variant: ExportVariant) -> Result<()> {
    let output = serialize(records, variant);
    write_atomic(path, output.as_bytes())?;
    tracing::debug!(path = %path.display(), records = records.len(), ?variant, "saved vCard file");
    Ok(())
}

/// Write through a temporary sibling file and rename it over `target`, so
/// a failed write never leaves a truncated file behind.
pub fn write_atomic(target: &Path, data: &[u8]) -> Result<()> {
    const OPERATION: &str = "writing file";

    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|err| Error::io(OPERATION, &parent, err))?;

    let file_name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("vcfclean");
    let mut counter: u32 = 0;
    let temp_path = loop {
        let candidate = if counter == 0 {
            parent.join(format!(".{file_name}.tmp"))
        } else {
            parent.join(format!(".{file_name}.{counter}.tmp"))
        };
        if !candidate.exists() {
            break candidate;
        }
        counter += 1;
    };

    {
        use std::fs::OpenOptions;
        use std::io::Write;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|err| Error::io(OPERATION, &temp_path, err))?;

        let written = file.write_all(data).and_then(|_| file.sync_all());
        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::io(OPERATION, &temp_path, err));
        }
    }

    if let Err(err) = fs::rename(&temp_path, target) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(OPERATION, target, err));
    }

    if let Ok(dir_file) = fs::File::open(&parent) {
        let _ = dir_file.sync_all();
    }

    Ok(())
}
