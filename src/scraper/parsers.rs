use crate::errors::{HarvestError, Result};
use crate::models::{BaseProfile, FavoriteItem, ProfileStats};
use crate::scraper::cleaner::sanitize_text;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;

const MIN_AGE: u8 = 13;
const MAX_AGE: u8 = 120;

static MEDIA_IMG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]+alt="([^"]+)"[^>]+src="(https://media\.senscritique\.com[^"]+)""#)
        .unwrap()
});

static BIO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(Homme|Femme|Autre)\s*\|\s*([^<\n|]+)").unwrap());

static AGE_TEXT: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)\b(\d{2,3})\s*ans\b").unwrap(),
        Regex::new(r"(?i)âge\s*:?\s*(\d{2,3})\b").unwrap(),
    ]
});

static AGE_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)data-age=["'](\d{1,3})["']"#).unwrap());

fn stat_regex(label: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b(\d+)\s*\n?\s*{}\b", label)).unwrap()
}

static STAT_FILMS: Lazy<Regex> = Lazy::new(|| stat_regex("Films"));
static STAT_SERIES: Lazy<Regex> = Lazy::new(|| stat_regex("S[ée]ries"));
static STAT_GAMES: Lazy<Regex> = Lazy::new(|| stat_regex("Jeux vid[ée]o"));
static STAT_BOOKS: Lazy<Regex> = Lazy::new(|| stat_regex("Livres"));
static STAT_TOTAL: Lazy<Regex> = Lazy::new(|| stat_regex("Total"));

static USERNAME_SEL: Lazy<Vec<Selector>> = Lazy::new(|| {
    [".elme-user-identity-username", r#"[data-testid="user-name"]"#, "h1"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

static OG_IMAGE_SEL: Lazy<Option<Selector>> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).ok());

static AVATAR_SEL: Lazy<Option<Selector>> = Lazy::new(|| {
    Selector::parse(r#"[data-testid="user-avatar"] img, img[class*="avatar"], img[alt*="avatar"]"#).ok()
});

// ── Profile page ──────────────────────────────────────────────────────────────

/// Text nodes of the page, one per line.
fn page_text(doc: &Html) -> String {
    doc.root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn stat(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text).and_then(|c| c[1].parse().ok())
}

fn parse_stats(text: &str) -> ProfileStats {
    let films = stat(&STAT_FILMS, text).unwrap_or(0);
    let series = stat(&STAT_SERIES, text).unwrap_or(0);
    let games = stat(&STAT_GAMES, text).unwrap_or(0);
    let books = stat(&STAT_BOOKS, text).unwrap_or(0);
    let total = stat(&STAT_TOTAL, text).unwrap_or(films + series + games + books);
    ProfileStats {
        films,
        series,
        games,
        books,
        total,
    }
}

/// `("Homme", "Paris")` from a "Homme | Paris" bio line.
fn parse_bio(text: &str) -> Option<(String, String)> {
    let caps = BIO.captures(text)?;
    let mut gender = caps[1].to_lowercase();
    if let Some(first) = gender.get(..1) {
        gender = format!("{}{}", first.to_uppercase(), &gender[1..]);
    }
    let location = caps[2].split_whitespace().collect::<Vec<_>>().join(" ");
    Some((gender, location))
}

fn parse_age(text: &str, html: &str) -> Option<u8> {
    let plausible = |n: &str| n.parse::<u8>().ok().filter(|a| (MIN_AGE..=MAX_AGE).contains(a));

    AGE_TEXT
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .find_map(|c| plausible(&c[1]))
        .or_else(|| AGE_ATTR.captures(html).and_then(|c| plausible(&c[1])))
}

fn parse_avatar(doc: &Html) -> Option<String> {
    let og = OG_IMAGE_SEL
        .as_ref()
        .and_then(|sel| doc.select(sel).next())
        .and_then(|m| m.value().attr("content"));
    let img = || {
        AVATAR_SEL
            .as_ref()
            .and_then(|sel| doc.select(sel).next())
            .and_then(|i| i.value().attr("src"))
    };
    og.or_else(img)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse the public profile page. Missing fields fall back to empty values;
/// only an empty page is an error.
pub fn parse_base_profile(html: &str, username: &str, profile_url: &str) -> Result<BaseProfile> {
    if html.trim().is_empty() {
        return Err(HarvestError::unavailable(username, "empty profile page"));
    }

    let doc = Html::parse_document(html);
    let text = page_text(&doc);

    let display_name = USERNAME_SEL
        .iter()
        .flat_map(|sel| doc.select(sel))
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| username.to_string());

    let (gender, location) = parse_bio(&text).unwrap_or_default();
    let age = parse_age(&text, html);
    let stats = parse_stats(&text);

    debug!(
        "Profile {}: gender={:?} location={:?} age={:?} total={}",
        display_name, gender, location, age, stats.total
    );

    Ok(BaseProfile {
        username: display_name,
        location,
        gender,
        age,
        stats,
        profile_url: profile_url.to_string(),
        avatar_url: parse_avatar(&doc).unwrap_or_default(),
        gallery: parse_favorites(html, username),
    })
}

// ── Favorites ─────────────────────────────────────────────────────────────────

/// Media images with an alt text, minus the user's own avatar.
pub fn parse_favorites(html: &str, username: &str) -> Vec<FavoriteItem> {
    let mut seen = HashSet::new();
    MEDIA_IMG
        .captures_iter(html)
        .filter_map(|c| {
            let title = sanitize_text(&c[1]);
            let image_url = c[2].trim().to_string();
            if title.is_empty() || title.contains(username) {
                return None;
            }
            Some(FavoriteItem { title, image_url })
        })
        .filter(|f| seen.insert(f.title.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"<html><head>
        <meta property="og:image" content="https://media.senscritique.com/media/000022812759/avatar.jpg">
      </head><body>
        <h1 class="elme-user-identity-username">KiMi_</h1>
        <p class="bio">Femme | Lyon  Presqu'île</p>
        <p>28 ans</p>
        <ul>
          <li><span>120</span>
              <span>Films</span></li>
          <li><span>45</span><span>Séries</span></li>
          <li><span>19</span><span>Jeux vidéo</span></li>
        </ul>
        <img alt="KiMi_" src="https://media.senscritique.com/media/000022812759/48x48/avatar.jpg">
        <img alt="Heat" src="https://media.senscritique.com/media/000004/heat.jpg">
        <img alt="Logo" src="https://www.senscritique.com/logo.png">
      </body></html>"#;

    #[test]
    fn test_parse_base_profile() {
        let p = parse_base_profile(PROFILE, "KiMi_", "https://www.senscritique.com/KiMi_").unwrap();
        assert_eq!(p.username, "KiMi_");
        assert_eq!(p.gender, "Femme");
        assert_eq!(p.location, "Lyon Presqu'île");
        assert_eq!(p.age, Some(28));
        assert_eq!(p.stats.films, 120);
        assert_eq!(p.stats.series, 45);
        assert_eq!(p.stats.games, 19);
        assert_eq!(p.stats.books, 0);
        assert_eq!(p.stats.total, 184);
        assert_eq!(
            p.avatar_url,
            "https://media.senscritique.com/media/000022812759/avatar.jpg"
        );
        assert_eq!(p.gallery.len(), 1);
        assert_eq!(p.gallery[0].title, "Heat");
    }

    #[test]
    fn test_sparse_profile_uses_empty_defaults() {
        let p = parse_base_profile("<html><body><p>Rien ici</p></body></html>", "ghost", "u").unwrap();
        assert_eq!(p.username, "ghost");
        assert_eq!(p.gender, "");
        assert_eq!(p.location, "");
        assert_eq!(p.age, None);
        assert_eq!(p.stats, ProfileStats::default());
        assert!(parse_base_profile("  ", "ghost", "u").is_err());
    }

    #[test]
    fn test_age_bounds() {
        assert_eq!(parse_age("Inscrit depuis 150 ans", ""), None);
        assert_eq!(parse_age("8 ans", ""), None);
        assert_eq!(parse_age("", r#"<div data-age="34">"#), Some(34));
        assert_eq!(parse_age("Âge : 41", ""), Some(41));
    }

    #[test]
    fn test_explicit_total_wins() {
        let stats = parse_stats("10\nFilms\n5\nSéries\n99\nTotal");
        assert_eq!(stats.total, 99);
    }

    #[test]
    fn test_favorites_skip_user_avatar() {
        let html = r#"
          <img class="poster" alt="Mulholland Drive" src="https://media.senscritique.com/media/1/md.jpg">
          <img class="poster" alt="Avatar de KiMi_" src="https://media.senscritique.com/media/2/a.jpg">
          <img class="poster" alt="Le Voyage de Chihiro" src="https://media.senscritique.com/media/3/c.jpg">
          <img class="poster" alt="Mulholland Drive" src="https://media.senscritique.com/media/1/md.jpg">"#;
        let favs = parse_favorites(html, "KiMi_");
        let titles: Vec<_> = favs.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, ["Mulholland Drive", "Le Voyage de Chihiro"]);
        assert_eq!(favs[1].image_url, "https://media.senscritique.com/media/3/c.jpg");
    }
}
