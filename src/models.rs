//! Core record types shared across the crawl, backfill and storage layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The 47 Japanese prefectures, in the canonical crawl order. These are
/// both the sub-scope enumeration for prefecture-paged sites and the only
/// legal values of a record's `prefecture` field.
pub const PREFECTURES: [&str; 47] = [
    "hokkaido", "aomori", "iwate", "miyagi", "akita", "yamagata", "fukushima", "tokyo",
    "kanagawa", "saitama", "chiba", "ibaraki", "tochigi", "gunma", "niigata", "yamanashi",
    "nagano", "toyama", "ishikawa", "fukui", "aichi", "gifu", "shizuoka", "mie", "osaka",
    "hyogo", "kyoto", "shiga", "nara", "wakayama", "hiroshima", "okayama", "tottori",
    "shimane", "yamaguchi", "tokushima", "kagawa", "ehime", "kochi", "fukuoka", "saga",
    "nagasaki", "kumamoto", "oita", "miyazaki", "kagoshima", "okinawa",
];

/// A source site. Each value names its own partition of the record store
/// and its own image directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    Hatomark,
    Nifty,
    NiftyRental,
    Sumai,
}

impl Site {
    pub fn as_str(&self) -> &'static str {
        match self {
            Site::Hatomark => "hatomark",
            Site::Nifty => "nifty",
            Site::NiftyRental => "nifty_rental",
            Site::Sumai => "sumai",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "hatomark" => Some(Site::Hatomark),
            "nifty" => Some(Site::Nifty),
            "nifty_rental" => Some(Site::NiftyRental),
            "sumai" => Some(Site::Sumai),
            _ => None,
        }
    }

    pub fn all() -> [Site; 4] {
        [Site::Hatomark, Site::Nifty, Site::NiftyRental, Site::Sumai]
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when the duplicate gate hits a known link.
///
/// Sites that list newest-first can stop the whole scope: one known link
/// implies everything after it is already stored. Sites without a reliable
/// ordering skip the listing and keep scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    StopScope,
    SkipListing,
}

/// A crawl sub-scope: one prefecture page sequence, or a single unit scope
/// for sites that paginate globally.
#[derive(Debug, Clone)]
pub struct CrawlScope {
    /// Human-readable name, used in logs.
    pub name: String,
    /// Site-specific URL parameter (e.g. a zero-padded area code).
    pub param: String,
    /// Prefecture token when the scope is one, applied to every record
    /// created under it.
    pub prefecture: Option<&'static str>,
}

impl CrawlScope {
    pub fn prefecture_scopes<F>(param: F) -> Vec<CrawlScope>
    where
        F: Fn(usize, &'static str) -> String,
    {
        PREFECTURES
            .iter()
            .enumerate()
            .map(|(i, name)| CrawlScope {
                name: (*name).to_string(),
                param: param(i + 1, name),
                prefecture: Some(*name),
            })
            .collect()
    }

    /// The single scope of a site without sub-scopes.
    pub fn unit() -> Vec<CrawlScope> {
        vec![CrawlScope {
            name: "all".to_string(),
            param: String::new(),
            prefecture: None,
        }]
    }
}

/// A value extracted from source markup, tagged with whether it still needs
/// the text-translation service. Closed-table lookups produce `Final`
/// English; free text stays `Raw` until the normalizer runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldText {
    Raw(String),
    Final(String),
}

impl FieldText {
    pub fn raw(s: impl Into<String>) -> Option<FieldText> {
        let s = s.into();
        if s.is_empty() {
            None
        } else {
            Some(FieldText::Raw(s))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldText::Raw(s) | FieldText::Final(s) => s,
        }
    }
}

/// Raw per-listing fields as pulled off the page, before translation and
/// currency normalization. Absence of a field on a given block is normal.
#[derive(Debug, Clone, Default)]
pub struct DraftFields {
    pub property_type: Option<FieldText>,
    pub price: Option<FieldText>,
    pub location: Option<FieldText>,
    pub transportation: Option<FieldText>,
    pub layout: Option<FieldText>,
    pub building_area: Option<FieldText>,
    pub land_area: Option<FieldText>,
    pub construction_date: Option<FieldText>,
    pub structure: Option<FieldText>,
    pub description: Option<FieldText>,
}

impl DraftFields {
    /// Fill holes from another set of fields without overwriting anything
    /// already present.
    pub fn merge_missing(&mut self, other: DraftFields) {
        fn fill(dst: &mut Option<FieldText>, src: Option<FieldText>) {
            if dst.is_none() {
                *dst = src;
            }
        }
        fill(&mut self.property_type, other.property_type);
        fill(&mut self.price, other.price);
        fill(&mut self.location, other.location);
        fill(&mut self.transportation, other.transportation);
        fill(&mut self.layout, other.layout);
        fill(&mut self.building_area, other.building_area);
        fill(&mut self.land_area, other.land_area);
        fill(&mut self.construction_date, other.construction_date);
        fill(&mut self.structure, other.structure);
        fill(&mut self.description, other.description);
    }
}

/// One listing block located on an index page. The link is extracted first
/// because it feeds the duplicate gate.
#[derive(Debug, Clone)]
pub struct IndexBlock {
    pub link: String,
    pub fields: DraftFields,
    /// Image URLs already visible on the index block. Only used for sites
    /// whose listings have no detail page of their own.
    pub image_urls: Vec<String>,
}

/// Fields only available on the listing's own detail page.
#[derive(Debug, Clone, Default)]
pub struct DetailPage {
    pub fields: DraftFields,
    pub contact_number: Option<String>,
    /// Gallery URLs in source presentation order, already deduplicated.
    pub image_urls: Vec<String>,
}

/// A fully normalized listing record, ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    /// Canonical source URL; the external dedupe key within a site partition.
    pub link: String,
    pub property_type: Option<String>,
    /// Normalized numeric price in USD.
    pub sale_price_usd: Option<f64>,
    /// Original-currency display string, retained separately.
    pub sale_price_yen: Option<String>,
    pub location: Option<String>,
    /// Lower-cased token from [`PREFECTURES`], when derivable.
    pub prefecture: Option<String>,
    pub transportation: Option<String>,
    pub layout: Option<String>,
    pub building_area: Option<String>,
    pub land_area: Option<String>,
    pub construction_date: Option<String>,
    pub structure: Option<String>,
    pub contact_number: Option<String>,
    pub description: Option<String>,
    /// Stored relative image paths, in source presentation order.
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    /// A new empty record for the given link, timestamped now.
    pub fn new(link: String) -> Self {
        Listing {
            id: Uuid::new_v4(),
            link,
            property_type: None,
            sale_price_usd: None,
            sale_price_yen: None,
            location: None,
            prefecture: None,
            transportation: None,
            layout: None,
            building_area: None,
            land_area: None,
            construction_date: None,
            structure: None,
            contact_number: None,
            description: None,
            images: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// True when a backfill pass should revisit this record.
    pub fn is_deficient(&self) -> bool {
        self.contact_number.as_deref().map_or(true, str::is_empty) || self.images.len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefecture_set_is_complete() {
        assert_eq!(PREFECTURES.len(), 47);
        assert_eq!(PREFECTURES[0], "hokkaido");
        assert_eq!(PREFECTURES[46], "okinawa");
    }

    #[test]
    fn site_names_round_trip() {
        for site in Site::all() {
            assert_eq!(Site::from_str(site.as_str()), Some(site));
        }
        assert_eq!(Site::from_str("zillow"), None);
    }

    #[test]
    fn prefecture_scopes_number_from_one() {
        let scopes = CrawlScope::prefecture_scopes(|i, _| format!("{:02}", i));
        assert_eq!(scopes.len(), 47);
        assert_eq!(scopes[0].param, "01");
        assert_eq!(scopes[0].prefecture, Some("hokkaido"));
        assert_eq!(scopes[46].param, "47");
    }

    #[test]
    fn merge_missing_never_overwrites() {
        let mut a = DraftFields {
            price: FieldText::raw("3,000万円"),
            ..Default::default()
        };
        let b = DraftFields {
            price: FieldText::raw("1円"),
            layout: FieldText::raw("2LDK"),
            ..Default::default()
        };
        a.merge_missing(b);
        assert_eq!(a.price, FieldText::raw("3,000万円"));
        assert_eq!(a.layout, FieldText::raw("2LDK"));
    }

    #[test]
    fn deficiency_predicate() {
        let mut l = Listing::new("https://example.com/1".into());
        assert!(l.is_deficient()); // no contact at all
        l.contact_number = Some("03-1234-5678".into());
        l.images = vec!["a.jpg".into()];
        assert!(l.is_deficient()); // exactly one image
        l.images.push("b.jpg".into());
        assert!(!l.is_deficient());
    }
}
