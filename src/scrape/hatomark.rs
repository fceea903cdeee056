//! Hatomark adapter: prefecture-paged buy/house search, area codes 01-47.
//! Index blocks carry most fields; the detail page adds the agent phone
//! number and the full gallery, which is ordered by an explicit
//! `data-index` ordinal rather than document order.

use scraper::{ElementRef, Html};
use tracing::warn;

use super::{sel, text_of, text_without_links, SiteAdapter};
use crate::error::ExtractError;
use crate::models::{
    CrawlScope, DetailPage, DraftFields, DuplicatePolicy, FieldText, IndexBlock, Site,
};

const BASE_URL: &str = "https://www.hatomarksite.com/search/zentaku/buy/house/area/{area}/list?price_b_from=&price_b_to=30000000&key_word=&land_area_all_from=&land_area_all_to=&land_area_unit=UNIT30&bld_area_from=&bld_area_to=&bld_area_unit=UNIT30&eki_walk=&expected_return_from=&expected_return_to=&limit=20&sort1=ASRT33&page={page}";

pub struct HatomarkAdapter;

impl SiteAdapter for HatomarkAdapter {
    fn site(&self) -> Site {
        Site::Hatomark
    }

    fn duplicate_policy(&self) -> DuplicatePolicy {
        // Results are sorted newest-first, so one known link means the
        // rest of the scope is already stored.
        DuplicatePolicy::StopScope
    }

    fn scopes(&self) -> Vec<CrawlScope> {
        CrawlScope::prefecture_scopes(|i, _| format!("{:02}", i))
    }

    fn page_url(&self, scope: &CrawlScope, page: u32) -> String {
        BASE_URL
            .replace("{area}", &scope.param)
            .replace("{page}", &page.to_string())
    }

    fn parse_index(&self, html: &str) -> Result<Vec<IndexBlock>, ExtractError> {
        let document = Html::parse_document(html);
        let table = document
            .select(&sel("div.row.g-4.list-table"))
            .next()
            .ok_or(ExtractError::MissingElement("listing table"))?;

        let mut blocks = Vec::new();
        for listing in table.select(&sel("div.row.g-4.list-table > div.col-12")) {
            // Link first: it feeds the duplicate gate, and a block without
            // one is not a listing we can store.
            let link = listing
                .select(&sel("div.box-footer.col-12.mt-2 a"))
                .next()
                .and_then(|a| a.value().attr("href"));
            let Some(link) = link else {
                warn!("hatomark listing block without link anchor, skipping");
                continue;
            };

            blocks.push(IndexBlock {
                link: link.to_string(),
                fields: index_fields(listing),
                image_urls: Vec::new(),
            });
        }
        Ok(blocks)
    }

    fn parse_detail(&self, _link: &str, html: &str) -> Result<DetailPage, ExtractError> {
        let document = Html::parse_document(html);
        let main = document
            .select(&sel("main"))
            .next()
            .ok_or(ExtractError::MissingElement("main"))?;

        let agent = main
            .select(&sel("div.info-agent"))
            .next()
            .ok_or(ExtractError::MissingElement("agent info"))?;

        let mut contact_number = None;
        for row in agent.select(&sel("div.col.d-flex.align-items-center")) {
            let Some(label) = row.select(&sel("p.room-detail-title")).next() else {
                continue;
            };
            if text_of(label).contains("TEL") {
                contact_number = next_sibling_paragraph(label).map(|p| text_of(p));
            }
        }

        Ok(DetailPage {
            fields: DraftFields::default(),
            contact_number,
            image_urls: gallery_urls(&document),
        })
    }
}

fn index_fields(listing: ElementRef) -> DraftFields {
    let mut fields = DraftFields::default();

    fields.property_type = listing
        .select(&sel("div.tag-list p"))
        .next()
        .and_then(|p| FieldText::raw(text_of(p)));

    // The address block embeds a map link whose text is noise.
    fields.location = listing
        .select(&sel("div.mb-1.address"))
        .next()
        .and_then(|div| FieldText::raw(text_without_links(div)));

    let lines: Vec<String> = listing
        .select(&sel("div.mb-1.traffic div"))
        .map(text_without_links)
        .filter(|s| !s.is_empty())
        .collect();
    if !lines.is_empty() {
        fields.transportation = FieldText::raw(lines.join(" / "));
    }

    // Fixed positional layout of the summary grid: price, construction
    // date, land area, building area, floors, floor plan. Presence varies
    // per block; absence is normal.
    let cells: Vec<String> = listing
        .select(&sel("div.row.g-2.row-cols-2 > div"))
        .filter_map(|div| div.select(&sel("p")).next())
        .map(text_of)
        .collect();
    fields.price = cells.first().and_then(|s| FieldText::raw(s.clone()));
    fields.construction_date = cells.get(1).and_then(|s| FieldText::raw(s.clone()));
    fields.land_area = cells.get(2).and_then(|s| FieldText::raw(s.clone()));
    fields.building_area = cells.get(3).and_then(|s| FieldText::raw(s.clone()));
    fields.structure = cells.get(4).and_then(|s| FieldText::raw(s.clone()));
    fields.layout = cells.get(5).and_then(|s| FieldText::raw(s.clone()));

    fields
}

fn next_sibling_paragraph(el: ElementRef) -> Option<ElementRef> {
    el.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "p")
}

/// Gallery URLs ordered by the explicit `data-index` ordinal on each slide,
/// not document order, with duplicates removed.
fn gallery_urls(document: &Html) -> Vec<String> {
    let mut indexed: Vec<(i64, String)> = Vec::new();
    for slide in document.select(&sel("div.slick-img")) {
        let ordinal = slide
            .value()
            .attr("data-index")
            .and_then(|v| v.parse::<i64>().ok());
        let src = slide
            .select(&sel("img"))
            .next()
            .and_then(|img| img.value().attr("src"));
        if let (Some(ordinal), Some(src)) = (ordinal, src) {
            if !indexed.iter().any(|(i, s)| *i == ordinal && s == src) {
                indexed.push((ordinal, src.to_string()));
            }
        }
    }
    indexed.sort_by_key(|(i, _)| *i);
    super::dedupe_urls(indexed.into_iter().map(|(_, s)| s).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX_PAGE: &str = r#"
    <html><body>
      <div class="row g-4 list-table">
        <div class="col-12">
          <div class="tag-list"><p>中古一戸建て</p></div>
          <div class="mb-1 address">北海道札幌市中央区 <a href="/map">地図</a></div>
          <div class="mb-1 traffic">
            <div>JR函館本線 札幌駅 <a href="/eki">駅</a></div>
            <div>バス 10分</div>
          </div>
          <div class="row g-2 row-cols-2">
            <div><p>3,000万円</p></div>
            <div><p>1985年4月</p></div>
            <div><p>210m²</p></div>
            <div><p>120m²</p></div>
            <div><p>2階建</p></div>
            <div><p>4LDK</p></div>
          </div>
          <div class="box-footer col-12 mt-2"><a href="https://www.hatomarksite.com/b/1">詳細</a></div>
        </div>
        <div class="col-12">
          <div class="tag-list"><p>土地・売地</p></div>
          <!-- no footer anchor: this block must be skipped -->
        </div>
        <div class="col-12">
          <div class="row g-2 row-cols-2"><div><p>980万円</p></div></div>
          <div class="box-footer col-12 mt-2"><a href="https://www.hatomarksite.com/b/2">詳細</a></div>
        </div>
      </div>
    </body></html>"#;

    #[test]
    fn index_blocks_extract_link_and_positional_fields() {
        let blocks = HatomarkAdapter.parse_index(INDEX_PAGE).unwrap();
        assert_eq!(blocks.len(), 2);

        let first = &blocks[0];
        assert_eq!(first.link, "https://www.hatomarksite.com/b/1");
        assert_eq!(first.fields.price, FieldText::raw("3,000万円"));
        assert_eq!(first.fields.construction_date, FieldText::raw("1985年4月"));
        assert_eq!(first.fields.land_area, FieldText::raw("210m²"));
        assert_eq!(first.fields.building_area, FieldText::raw("120m²"));
        assert_eq!(first.fields.structure, FieldText::raw("2階建"));
        assert_eq!(first.fields.layout, FieldText::raw("4LDK"));
        assert_eq!(
            first.fields.transportation,
            FieldText::raw("JR函館本線 札幌駅 / バス 10分")
        );
        assert_eq!(first.fields.location, FieldText::raw("北海道札幌市中央区"));

        // The anchor-less block was dropped; the sparse one kept what it had.
        let sparse = &blocks[1];
        assert_eq!(sparse.link, "https://www.hatomarksite.com/b/2");
        assert_eq!(sparse.fields.price, FieldText::raw("980万円"));
        assert!(sparse.fields.layout.is_none());
    }

    #[test]
    fn missing_listing_table_is_a_page_error() {
        let err = HatomarkAdapter.parse_index("<html><body></body></html>").unwrap_err();
        assert!(matches!(err, ExtractError::MissingElement(_)));
    }

    #[test]
    fn detail_contact_and_ordinal_ordered_gallery() {
        let html = r#"
        <html><body><main>
          <div class="info-agent">
            <div class="col d-flex align-items-center">
              <p class="room-detail-title">会社名</p><p>ハト不動産</p>
            </div>
            <div class="col d-flex align-items-center">
              <p class="room-detail-title">TEL</p><p>011-222-3333</p>
            </div>
          </div>
          <div class="slick-img" data-index="2"><img src="https://img/c.jpg"></div>
          <div class="slick-img" data-index="0"><img src="https://img/a.jpg"></div>
          <div class="slick-img" data-index="1"><img src="https://img/b.jpg"></div>
          <div class="slick-img" data-index="1"><img src="https://img/b.jpg"></div>
          <div class="slick-img"><img src="https://img/no-ordinal.jpg"></div>
        </main></body></html>"#;

        let detail = HatomarkAdapter.parse_detail("https://www.hatomarksite.com/b/1", html).unwrap();
        assert_eq!(detail.contact_number.as_deref(), Some("011-222-3333"));
        assert_eq!(
            detail.image_urls,
            vec!["https://img/a.jpg", "https://img/b.jpg", "https://img/c.jpg"]
        );
    }

    #[test]
    fn scope_urls_use_zero_padded_area_codes() {
        let scopes = HatomarkAdapter.scopes();
        assert_eq!(scopes.len(), 47);
        let url = HatomarkAdapter.page_url(&scopes[0], 3);
        assert!(url.contains("/area/01/"));
        assert!(url.ends_with("page=3"));
    }
}
