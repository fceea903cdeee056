//! Nifty adapter: prefecture-paged new detached-house search. The index
//! carries the badge property type (closed enumeration), price, location
//! and the badge-labelled area grid; detail pages live either on nifty
//! itself or on the pitat partner domain, with different contact markup.
//! Backfill re-fetches go through the rendering proxy because the detail
//! gallery is assembled client-side.

use scraper::{ElementRef, Html};
use tracing::warn;

use super::{absolutize, dedupe_urls, sel, text_of, SiteAdapter};
use crate::error::ExtractError;
use crate::models::{
    CrawlScope, DetailPage, DraftFields, DuplicatePolicy, FieldText, IndexBlock, Site,
};
use crate::translate::{area_label_english, property_type_english};

const ORIGIN: &str = "https://myhome.nifty.com";
const BASE_URL: &str = "https://myhome.nifty.com/shinchiku-ikkodate/{pref}/search/{page}/?subtype=bnh,buh&b2=30000000&pnum=40&sort=regDate-desc";

const PROPERTY_TYPE_BADGE: &str =
    "span.badge.is-plain.is-pj1.is-margin-right-xxs.is-middle.is-strong.is-xs";
const AREA_ROW: &str = "div.box.is-flex.is-middle.is-nowrap.is-gap-4px";
const AREA_LABEL: &str = "span.badge.is-plain.is-grey-dark.is-strong.is-xxs";
const AREA_VALUE: &str = "span.text.is-sm";

pub struct NiftyAdapter;

impl SiteAdapter for NiftyAdapter {
    fn site(&self) -> Site {
        Site::Nifty
    }

    fn duplicate_policy(&self) -> DuplicatePolicy {
        // Sorted by registration date descending.
        DuplicatePolicy::StopScope
    }

    fn scopes(&self) -> Vec<CrawlScope> {
        CrawlScope::prefecture_scopes(|_, name| name.to_string())
    }

    fn page_url(&self, scope: &CrawlScope, page: u32) -> String {
        BASE_URL
            .replace("{pref}", &scope.param)
            .replace("{page}", &page.to_string())
    }

    fn parse_index(&self, html: &str) -> Result<Vec<IndexBlock>, ExtractError> {
        let document = Html::parse_document(html);
        document
            .select(&sel("ul.box.is-space-sm"))
            .next()
            .ok_or(ExtractError::MissingElement("listing list"))?;

        let mut blocks = Vec::new();
        for listing in document.select(&sel("ul.box.is-space-sm > li")) {
            let link = listing
                .select(&sel("a"))
                .next()
                .and_then(|a| a.value().attr("href"));
            let Some(link) = link else {
                warn!("nifty listing block without link anchor, skipping");
                continue;
            };

            blocks.push(IndexBlock {
                link: absolutize(ORIGIN, link),
                fields: index_fields(listing)?,
                image_urls: Vec::new(),
            });
        }
        Ok(blocks)
    }

    fn parse_detail(&self, link: &str, html: &str) -> Result<DetailPage, ExtractError> {
        let document = Html::parse_document(html);
        let main = document
            .select(&sel("main"))
            .next()
            .ok_or(ExtractError::MissingElement("main"))?;

        let contact_number = if link.contains("nifty") {
            nifty_contact(main)
        } else if link.contains("pitat") {
            pitat_contact(main)
        } else {
            None
        };

        // Only nifty-hosted pages expose a scrapeable gallery.
        let image_urls = if link.contains("nifty") {
            nifty_gallery(&document)
        } else {
            Vec::new()
        };

        Ok(DetailPage {
            fields: DraftFields::default(),
            contact_number,
            image_urls,
        })
    }

    fn backfill_via_proxy(&self) -> bool {
        true
    }
}

fn index_fields(listing: ElementRef) -> Result<DraftFields, ExtractError> {
    let mut fields = DraftFields::default();

    // Badge values are a closed enumeration; anything new is a schema
    // change that must surface, not free text to translate.
    if let Some(badge) = listing.select(&sel(PROPERTY_TYPE_BADGE)).next() {
        let mapped = property_type_english(&text_of(badge))?;
        fields.property_type = Some(FieldText::Final(mapped.to_string()));
    }

    fields.price = listing
        .select(&sel("p"))
        .next()
        .and_then(|p| FieldText::raw(text_of(p)));

    let boxes: Vec<ElementRef> = listing.select(&sel("div.box.is-space-xs")).collect();
    if let Some(loc_trans) = boxes.get(1).or_else(|| boxes.first()) {
        let spans: Vec<String> = loc_trans.select(&sel("span")).map(text_of).collect();
        if spans.len() >= 2 {
            fields.transportation = FieldText::raw(spans[0].clone());
            fields.location = FieldText::raw(spans[1].clone());
        } else if let Some(only) = spans.first() {
            fields.location = FieldText::raw(only.clone());
        }
    }

    for row in listing.select(&sel(AREA_ROW)) {
        let Some(label) = row.select(&sel(AREA_LABEL)).next() else {
            continue;
        };
        let Some(value) = row.select(&sel(AREA_VALUE)).next() else {
            continue;
        };
        let value = FieldText::raw(text_of(value));
        match area_label_english(&text_of(label))? {
            "Land - Area" => fields.land_area = value,
            "Building - Area" => fields.building_area = value,
            "Building - Layout" => fields.layout = value,
            "Building - Construction Date" => fields.construction_date = value,
            "Building - Structure" => fields.structure = value,
            // Ratios and floor numbers have no column in the record.
            _ => {}
        }
    }

    Ok(fields)
}

fn nifty_contact(main: ElementRef) -> Option<String> {
    let inquiry = main.select(&sel("div#inquiryArea")).next()?;
    let dt = inquiry
        .select(&sel("dt"))
        .find(|dt| text_of(*dt) == "電話番号")?;
    dt.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "dd")
        .map(|dd| text_of(dd))
}

fn pitat_contact(main: ElementRef) -> Option<String> {
    main.select(&sel("div.detail-top-info__tel"))
        .next()?
        .select(&sel("div.main"))
        .next()
        .map(|div| text_of(div))
}

fn nifty_gallery(document: &Html) -> Vec<String> {
    let Some(summary) = document.select(&sel("div#summary")).next() else {
        return Vec::new();
    };
    let urls = summary
        .select(&sel("img.thumbnail"))
        .filter_map(|img| img.value().attr("src"))
        .map(str::to_string)
        .collect();
    dedupe_urls(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX_PAGE: &str = r#"
    <html><body>
      <ul class="box is-space-sm">
        <li>
          <a href="/bukken/123/">物件</a>
          <span class="badge is-plain is-pj1 is-margin-right-xxs is-middle is-strong is-xs">新築一戸建て</span>
          <p>2,980万円</p>
          <div class="box is-space-xs"><span>広告</span></div>
          <div class="box is-space-xs">
            <span>JR中央線 三鷹駅 徒歩10分</span>
            <span>東京都三鷹市下連雀</span>
          </div>
          <div class="box is-flex is-middle is-nowrap is-gap-4px">
            <span class="badge is-plain is-grey-dark is-strong is-xxs">間取り</span>
            <span class="text is-sm">3LDK</span>
          </div>
          <div class="box is-flex is-middle is-nowrap is-gap-4px">
            <span class="badge is-plain is-grey-dark is-strong is-xxs">土地面積</span>
            <span class="text is-sm">100.5m²</span>
          </div>
        </li>
        <li><span>リンクのないブロック</span></li>
      </ul>
    </body></html>"#;

    #[test]
    fn index_maps_badges_and_prefixes_relative_links() {
        let blocks = NiftyAdapter.parse_index(INDEX_PAGE).unwrap();
        assert_eq!(blocks.len(), 1);

        let block = &blocks[0];
        assert_eq!(block.link, "https://myhome.nifty.com/bukken/123/");
        assert_eq!(
            block.fields.property_type,
            Some(FieldText::Final("Newly Constructed Detached House".into()))
        );
        assert_eq!(block.fields.price, FieldText::raw("2,980万円"));
        assert_eq!(
            block.fields.transportation,
            FieldText::raw("JR中央線 三鷹駅 徒歩10分")
        );
        assert_eq!(block.fields.location, FieldText::raw("東京都三鷹市下連雀"));
        assert_eq!(block.fields.layout, FieldText::raw("3LDK"));
        assert_eq!(block.fields.land_area, FieldText::raw("100.5m²"));
    }

    #[test]
    fn unknown_property_type_badge_fails_loudly() {
        let html = r#"
        <ul class="box is-space-sm"><li>
          <a href="/bukken/9/">x</a>
          <span class="badge is-plain is-pj1 is-margin-right-xxs is-middle is-strong is-xs">別荘</span>
        </li></ul>"#;
        let err = NiftyAdapter.parse_index(html).unwrap_err();
        assert!(matches!(err, ExtractError::Schema(_)));
    }

    #[test]
    fn nifty_detail_contact_and_gallery() {
        let html = r#"
        <html><body><main>
          <div id="inquiryArea">
            <dl>
              <dt>会社名</dt><dd>ニフティ不動産</dd>
              <dt>電話番号</dt><dd>0120-111-222</dd>
            </dl>
          </div>
        </main>
        <div id="summary">
          <img class="thumbnail" src="https://img/1.jpg">
          <img class="thumbnail" src="https://img/2.jpg">
          <img class="thumbnail" src="https://img/1.jpg">
        </div>
        </body></html>"#;

        let detail = NiftyAdapter
            .parse_detail("https://myhome.nifty.com/bukken/123/", html)
            .unwrap();
        assert_eq!(detail.contact_number.as_deref(), Some("0120-111-222"));
        assert_eq!(detail.image_urls, vec!["https://img/1.jpg", "https://img/2.jpg"]);
    }

    #[test]
    fn pitat_detail_has_no_gallery() {
        let html = r#"
        <html><body><main>
          <div class="detail-top-info__tel"><div class="main">06-7777-8888</div></div>
        </main></body></html>"#;

        let detail = NiftyAdapter
            .parse_detail("https://www.pitat.com/bukken/5", html)
            .unwrap();
        assert_eq!(detail.contact_number.as_deref(), Some("06-7777-8888"));
        assert!(detail.image_urls.is_empty());
    }
}
