//! Location fragments pulled out of the bank's free-text detail column, and
//! the map-search links built from them.
//!
//! Everything here is plain string work: no lookups, no network.

use std::sync::OnceLock;

use regex::{NoExpand, Regex};

pub const DEFAULT_MAPS_TEMPLATE: &str = "https://www.google.com/maps/search/{query}";

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_country_field, r"(?i)\s*kraj\s*:\s*[^,]*");
re!(re_field_prefix, r"(?i)\b(?:miasto|adres|lokalizacja)\s*:");
re!(re_colon, r"\s*:\s*");
re!(re_spaces, r"\s+");
re!(re_double_comma, r",\s*,");
re!(re_words_number, r"\w+\s+\w+\s+\d+");
re!(re_digit, r"\d");
re!(re_lokalizacja, r"(?i)lokalizacja\s*:\s*");
re!(re_kraj, r"(?i)kraj\s*:\s*");
re!(
    re_structured,
    r"(?i)adres\s*:\s*(?P<address>.*?)\s*(?:miasto\s*:\s*(?P<city>.*?))?(?:kraj\s*:\s*.*)?$"
);
re!(re_country_suffix, r"(?i)\s*:\s*([^:]+?)\s+kraj\s*:\s*\w+$");

const FIELD_PREFIXES: &[&str] = &[
    "miasto :",
    "miasto:",
    "adres :",
    "adres:",
    "lokalizacja :",
    "lokalizacja:",
];

// ASCII-folded spellings the bank produces, mapped back to the real names.
const DIACRITICS: &[(&str, &str)] = &[
    ("lodz", "łódź"),
    ("krakow", "kraków"),
    ("poznan", "poznań"),
    ("wroclaw", "wrocław"),
    ("gdansk", "gdańsk"),
    ("czestochowa", "częstochowa"),
    ("torun", "toruń"),
    ("bialystok", "białystok"),
    ("rzeszow", "rzeszów"),
    ("piotrkow", "piotrków"),
    ("walbrzych", "wałbrzych"),
    ("wloclawek", "włocławek"),
    ("jelenia gora", "jelenia góra"),
    ("nowy sacz", "nowy sącz"),
    ("zielona gora", "zielona góra"),
    ("kosciuszki", "kościuszki"),
    ("pilsudskiego", "piłsudskiego"),
    ("slowackiego", "słowackiego"),
    ("zeromskiego", "żeromskiego"),
    ("swietokrzyska", "świętokrzyska"),
    ("stanislawa", "stanisława"),
    ("wladyslawa", "władysława"),
    ("jozefa", "józefa"),
    ("legionow", "legionów"),
    ("zwyciestwa", "zwycięstwa"),
    ("polnocna", "północna"),
    ("poludniowa", "południowa"),
    ("krolowej", "królowej"),
    ("powstancow", "powstańców"),
    ("sw.", "św."),
    ("sw ", "św. "),
];

const ADDRESS_MARKERS: &[&str] = &[
    "ul.", "al.", "pl.", "os.", "centrum", "calle", "avenida", "avda.", "paseo", "plaza", "via",
    "viale", "piazza", "corso", "strada",
];

const STREET_MARKERS: &[&str] = &[
    "ul.", "al.", "pl.", "os.", "aleja", "ulica", "plac", "osiedle", "street", "st.", "avenue",
    "ave.", "road", "rd.", "boulevard", "blvd.", "lane", "ln.", "drive", "dr.", "calle", "avenida",
    "avda.", "paseo", "plaza", "via", "viale", "piazza", "corso", "strada",
];

const CITIES: &[&str] = &[
    "warszawa", "kraków", "łódź", "wrocław", "poznań", "gdańsk", "szczecin", "bydgoszcz",
    "lublin", "katowice", "białystok", "gdynia", "częstochowa", "radom", "sosnowiec", "toruń",
    "kielce", "gliwice", "zabrze", "bytom", "olsztyn", "bielsko-biała", "rzeszów", "madrid",
    "barcelona", "valencia", "sevilla", "zaragoza", "málaga", "murcia", "palma", "bilbao",
    "alicante", "córdoba", "valladolid", "granada", "salamanca", "toledo", "roma", "milano",
    "napoli", "torino", "palermo", "genova", "bologna", "firenze", "bari", "catania", "venezia",
    "verona", "messina", "padova", "trieste", "brescia", "parma", "modena",
];

// Generic transaction wording that is never a place.
const GENERIC_TERMS: &[&str] = &[
    "nan",
    "null",
    "zakup w terminalu",
    "pc game purchase",
    "grocery store",
    "groceries",
    "store",
    "shop",
    "market",
];

fn is_generic(text: &str) -> bool {
    GENERIC_TERMS.contains(&text.to_lowercase().as_str())
}

// `\b` only where the term ends in a word character; after `.` or a space it
// would demand a following letter.
fn word_pattern(term: &str) -> String {
    let tail = if term.ends_with(|c: char| c.is_alphanumeric()) {
        r"\b"
    } else {
        ""
    };
    format!(r"\b{}{tail}", regex::escape(term))
}

fn any_word(terms: &[&str]) -> Regex {
    let alternatives: Vec<String> = terms.iter().map(|t| word_pattern(t)).collect();
    Regex::new(&format!("(?i)(?:{})", alternatives.join("|"))).expect("invalid regex")
}

fn address_markers() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| any_word(ADDRESS_MARKERS))
}

fn street_markers() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| any_word(STREET_MARKERS))
}

fn cities() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| any_word(CITIES))
}

fn diacritic_patterns() -> &'static [(Regex, &'static str)] {
    static R: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    R.get_or_init(|| {
        DIACRITICS
            .iter()
            .map(|(ascii, proper)| {
                let pattern = format!("(?i){}", word_pattern(ascii));
                (Regex::new(&pattern).expect("invalid regex"), *proper)
            })
            .collect()
    })
}

/// Strip `kraj:`/`miasto:`/`adres:` boilerplate and standardise separators
/// to comma-joined components.
pub fn clean_location(raw: &str) -> String {
    let cleaned = re_country_field().replace_all(raw, "");
    let cleaned = re_field_prefix().replace_all(&cleaned, " ");
    let cleaned = re_colon().replace_all(&cleaned, ", ");
    let cleaned = re_spaces().replace_all(&cleaned, " ");
    let cleaned = re_double_comma().replace_all(&cleaned, ",");
    cleaned.trim_matches(|c| c == ' ' || c == ',').to_string()
}

/// Put Polish diacritics back on well-known names typed without them.
pub fn restore_diacritics(location: &str) -> String {
    let mut out = location.to_string();
    for (re, proper) in diacritic_patterns() {
        if re.is_match(&out) {
            out = re.replace_all(&out, NoExpand(proper)).into_owned();
        }
    }
    out
}

/// Pick the most reliable location fragment out of a `//`-separated detail
/// string, cleaned and normalized. `None` when nothing place-like is found.
pub fn extract_location(text: &str) -> Option<String> {
    let parts: Vec<&str> = text
        .split("//")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let candidate = parts
        .iter()
        .find_map(|p| structured_part(p))
        .or_else(|| parts.iter().find_map(|p| dash_part(p)))
        .or_else(|| {
            parts
                .iter()
                .find(|p| looks_like_address(p))
                .map(|p| p.to_string())
        })
        .or_else(|| {
            parts
                .iter()
                .find(|p| !is_generic(p) && p.chars().count() > 3)
                .map(|p| p.to_string())
        })?;

    let finished = restore_diacritics(&clean_location(&candidate));
    if finished.is_empty() {
        None
    } else {
        Some(finished)
    }
}

// `... lokalizacja: adres: X miasto: Y kraj: Z`
fn structured_part(part: &str) -> Option<String> {
    let lowered = part.to_lowercase();
    if !lowered.contains("lokalizacja") || !lowered.contains("adres") {
        return None;
    }
    let tail = part.rsplit(" - ").next().unwrap_or(part).trim();
    let working = if tail.to_lowercase().contains("lokalizacja") {
        tail
    } else {
        part
    };
    let mut split = re_lokalizacja().splitn(working, 2);
    split.next()?;
    address_payload(split.next()?)
}

fn address_payload(payload: &str) -> Option<String> {
    let trim = |s: &str| s.trim_matches(|c| c == ' ' || c == ',').to_string();

    if let Some(caps) = re_structured().captures(payload) {
        let address = caps.name("address").map(|m| trim(m.as_str())).unwrap_or_default();
        let city = caps.name("city").map(|m| trim(m.as_str())).unwrap_or_default();
        return match (address.is_empty(), city.is_empty()) {
            (false, false) => Some(format!("{address}, {city}")),
            (false, true) => Some(address),
            (true, false) => Some(city),
            (true, true) => None,
        };
    }

    let without_country = trim(re_kraj().splitn(payload, 2).next().unwrap_or(""));
    if without_country.is_empty() {
        return None;
    }
    if let Some((address, city)) = without_country.rsplit_once(':') {
        let (address, city) = (trim(address), trim(city));
        if !address.is_empty() && !city.is_empty() {
            return Some(format!("{address}, {city}"));
        }
    }
    Some(without_country)
}

// `SOMETHING - ADDRESS`
fn dash_part(part: &str) -> Option<String> {
    if !part.contains(" - ") || part.to_lowercase().contains("lokalizacja") {
        return None;
    }
    let candidate = part.rsplit(" - ").next()?.trim();
    if candidate.is_empty() || is_generic(candidate) {
        return None;
    }
    Some(candidate.to_string())
}

fn looks_like_address(part: &str) -> bool {
    if is_generic(part) {
        return false;
    }
    if address_markers().is_match(part) {
        return true;
    }
    if re_words_number().is_match(part) {
        return true;
    }
    re_digit().is_match(part) && part.chars().count() > 8
}

/// Build a map-search URL for `location` from `template`, substituting the
/// percent-encoded text for `{query}`.
///
/// Only locations that look geocodable get a link: a street marker, or a
/// comma together with a house number or a known city.
pub fn maps_link(location: &str, template: &str) -> Option<String> {
    let mut trimmed = location.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }

    let has_street = street_markers().is_match(&trimmed);
    let has_comma = trimmed.contains(',');
    let has_number = re_digit().is_match(&trimmed);
    let has_city = cities().is_match(&trimmed);
    if !(has_street || (has_comma && (has_number || has_city))) {
        return None;
    }

    for prefix in FIELD_PREFIXES {
        let has_prefix = trimmed
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if has_prefix {
            trimmed = trimmed[prefix.len()..].trim().to_string();
        }
    }

    let cleaned = re_country_suffix().replace_all(&trimmed, ", $1");
    let cleaned = re_colon().replace_all(&cleaned, ", ");
    let cleaned = re_spaces().replace_all(&cleaned, " ");
    let cleaned = re_double_comma().replace_all(&cleaned, ",");
    let cleaned = cleaned.trim_matches(|c| c == ' ' || c == ',');
    if cleaned.is_empty() {
        return None;
    }

    Some(template.replace("{query}", &percent_encode(cleaned)))
}

/// Percent-encode UTF-8 bytes outside the RFC 3986 unreserved set, keeping `/`.
fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 3);
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
