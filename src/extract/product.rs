use super::{all_text, first_own_text, own_text, pattern, select_all};
use crate::extract::clean::{standardize_date, str_to_int, strip_text, Amount};
use crate::url::{canonicalize_url, strip_tracking};
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use url::Url;

static RE_APP_ID: OnceLock<Regex> = OnceLock::new();
static RE_REVIEW_COUNT: OnceLock<Regex> = OnceLock::new();

/// Labels of the details block and the field each one fills
const DETAIL_LABELS: [(&str, DetailField); 5] = [
    ("Title:", DetailField::Title),
    ("Genre:", DetailField::Genres),
    ("Developer:", DetailField::Developer),
    ("Publisher:", DetailField::Publisher),
    ("Release Date:", DetailField::ReleaseDate),
];

#[derive(Debug, Clone, Copy)]
enum DetailField {
    Title,
    Genres,
    Developer,
    Publisher,
    ReleaseDate,
}

/// Metadata of one store product page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Page URL without the tracking parameter, canonicalized
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    /// `YYYY-MM-DD` when the date could be read, the raw label otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub specs: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Amount>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_price: Option<Amount>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_reviews: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metascore: Option<u64>,

    pub early_access: bool,
}

/// Community review listing for an app, newest first, starting at page 1
pub fn reviews_url_for(product_id: &str) -> String {
    format!(
        "http://steamcommunity.com/app/{}/reviews/?browsefilter=mostrecent&p=1",
        product_id
    )
}

/// Extracts a product record from a store app page
///
/// # Arguments
///
/// * `html` - The page body
/// * `url` - Final URL of the page (after redirects)
pub fn load_product(html: &str, url: &Url) -> ProductRecord {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let id = RE_APP_ID
        .get_or_init(|| pattern(r"/app/(.*?)/"))
        .captures(url.as_str())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let mut record = ProductRecord {
        url: canonicalize_url(&strip_tracking(url)).to_string(),
        reviews_url: id.as_deref().map(reviews_url_for),
        id,
        app_name: all_text(root, ".apphub_AppName").into_iter().next(),
        specs: non_empty(all_text(root, ".game_area_details_specs a")),
        tags: non_empty(
            select_all(root, "a.app_tag")
                .into_iter()
                .flat_map(own_text)
                .map(strip_text)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        sentiment: sentiment(root),
        n_reviews: review_count(root),
        metascore: first_own_text(root, "#game_area_metascore > div[class*='score']")
            .and_then(|s| str_to_int(&s)),
        early_access: !select_all(root, ".early_access_header").is_empty(),
        ..ProductRecord::default()
    };

    // Regular price, or the pre-discount price plus the discounted one
    match all_text(root, ".game_purchase_price").into_iter().next() {
        Some(price) => record.price = Amount::parse(&price),
        None => {
            record.price = all_text(root, ".discount_original_price")
                .first()
                .and_then(|p| Amount::parse(p));
            record.discount_price = all_text(root, ".discount_final_price")
                .first()
                .and_then(|p| Amount::parse(p));
        }
    }

    if let Some(block) = select_all(root, ".details_block").into_iter().next() {
        apply_details(&mut record, block);
    }

    record
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

/// Reads the `<br>`-separated "Label: value" lines of the details block
///
/// The first line carrying a label wins.
fn apply_details(record: &mut ProductRecord, block: ElementRef<'_>) {
    let mut lines = vec![String::new()];
    for node in block.descendants() {
        match node.value() {
            Node::Text(text) => {
                if let Some(line) = lines.last_mut() {
                    line.push_str(text);
                }
            }
            Node::Element(el) if el.name() == "br" => lines.push(String::new()),
            _ => {}
        }
    }

    for line in lines {
        let line: String = line.chars().filter(|c| !matches!(c, '\r' | '\t' | '\n')).collect();
        for (label, field) in DETAIL_LABELS {
            if !line.contains(label) {
                continue;
            }
            let value = line.replace(label, "");
            let value = strip_text(&value);
            if value.is_empty() {
                continue;
            }

            match field {
                DetailField::Title => set_once(&mut record.title, value.to_string()),
                DetailField::Developer => set_once(&mut record.developer, value.to_string()),
                DetailField::Publisher => set_once(&mut record.publisher, value.to_string()),
                DetailField::ReleaseDate => {
                    set_once(&mut record.release_date, standardize_date(value))
                }
                DetailField::Genres => {
                    let genres = value
                        .split(',')
                        .map(strip_text)
                        .filter(|g| !g.is_empty())
                        .map(str::to_string)
                        .collect();
                    set_once(&mut record.genres, genres);
                }
            }
        }
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

/// Review summary label, from the description next to `.game_review_summary`
fn sentiment(root: ElementRef<'_>) -> Option<String> {
    select_all(root, ".game_review_summary")
        .into_iter()
        .filter_map(|summary| summary.parent().and_then(ElementRef::wrap))
        .flat_map(|parent| {
            parent
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|el| el.value().attr("itemprop") == Some("description"))
                .collect::<Vec<_>>()
        })
        .flat_map(own_text)
        .map(strip_text)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// Largest "(N reviews)" count shown in the review summaries
fn review_count(root: ElementRef<'_>) -> Option<u64> {
    let re = RE_REVIEW_COUNT.get_or_init(|| pattern(r"\(([\d,]+) reviews\)"));

    select_all(root, ".responsive_hidden")
        .into_iter()
        .map(|el| el.html())
        .flat_map(|html| {
            re.captures_iter(&html)
                .filter_map(|caps| caps.get(1).and_then(|m| str_to_int(m.as_str())))
                .collect::<Vec<_>>()
        })
        .max()
}
