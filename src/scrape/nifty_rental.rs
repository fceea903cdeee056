//! Nifty rental adapter: the rental search paginates per city, not per
//! prefecture, so each prefecture scope is expanded by fetching its city
//! list first. Every rental unit row on the index carries the whole record
//! (prices, plan, images); there are no detail pages to visit, and the
//! site throttles lightly enough that crawls use the short backoff.

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use tracing::warn;

use super::{absolutize, sel, text_of, SiteAdapter};
use crate::error::{Error, ExtractError};
use crate::fetch::Fetch;
use crate::models::{
    CrawlScope, DetailPage, DraftFields, DuplicatePolicy, FieldText, IndexBlock, Site,
};

const ORIGIN: &str = "https://myhome.nifty.com";
const CITY_LIST_CONTAINER: &str = r#"[data-contents-id="search-condition-city"]"#;

const LOCATION_BOX: &str = "div.box.is-mobile-0.is-space-sm";
const BUILDING_INFO: &str = "div.bukken-info-items.is-flex";
const MAIN_THUMBNAIL: &str = "div.thumbnail-wrap.is-contain.is-width-200px.is-4x3 img.lazyload.thumbnail";
const UNIT_TABLE: &str = "table.result-bukken-table";
const RENT_VALUE: &str = "p.text.is-strong";

pub struct NiftyRentalAdapter;

#[async_trait]
impl SiteAdapter for NiftyRentalAdapter {
    fn site(&self) -> Site {
        Site::NiftyRental
    }

    fn duplicate_policy(&self) -> DuplicatePolicy {
        // Sorted by registration date descending.
        DuplicatePolicy::StopScope
    }

    fn scopes(&self) -> Vec<CrawlScope> {
        CrawlScope::prefecture_scopes(|_, name| name.to_string())
    }

    async fn discover_scopes(
        &self,
        fetch: &dyn Fetch,
        scope: &CrawlScope,
    ) -> Result<Vec<CrawlScope>, Error> {
        let url = format!("{ORIGIN}/rent/{}/city/?cityTab", scope.param);
        let page = fetch.fetch(&url).await?;
        Ok(city_scopes(scope, &page.body)?)
    }

    fn page_url(&self, scope: &CrawlScope, page: u32) -> String {
        // `param` is the absolute city base URL from `discover_scopes`.
        format!("{}{page}/?sort=regDate-desc", scope.param)
    }

    fn parse_index(&self, html: &str) -> Result<Vec<IndexBlock>, ExtractError> {
        let document = Html::parse_document(html);
        document
            .select(&sel("ul.box.is-space-sm"))
            .next()
            .ok_or(ExtractError::MissingElement("listing list"))?;

        let mut blocks = Vec::new();
        for building in document.select(&sel("ul.box.is-space-sm > li")) {
            let shared = building_fields(building);
            let main_image = building
                .select(&sel(MAIN_THUMBNAIL))
                .next()
                .and_then(|img| img.value().attr("data-src"))
                .map(str::to_string);

            // One building block fans out into one record per unit row.
            let Some(table) = building.select(&sel(UNIT_TABLE)).next() else {
                warn!("nifty rental building without unit table, skipping");
                continue;
            };
            for unit in table.select(&sel("tbody")) {
                let link = unit
                    .select(&sel("a"))
                    .next()
                    .and_then(|a| a.value().attr("href"));
                let Some(link) = link else {
                    warn!("nifty rental unit row without link anchor, skipping");
                    continue;
                };

                let mut fields = shared.clone();
                let mut image_urls: Vec<String> = main_image.iter().cloned().collect();
                unit_fields(unit, &mut fields, &mut image_urls);

                blocks.push(IndexBlock {
                    link: absolutize(ORIGIN, link),
                    fields,
                    image_urls,
                });
            }
        }
        Ok(blocks)
    }

    /// Rental records are fully described by their index row.
    fn parse_detail(&self, _link: &str, _html: &str) -> Result<DetailPage, ExtractError> {
        Ok(DetailPage::default())
    }

    fn has_detail_pages(&self) -> bool {
        false
    }

    fn fast_backoff(&self) -> bool {
        true
    }
}

/// Expand one prefecture into its city page sequences. The city links are
/// relative hrefs; each becomes a scope whose `param` is the absolute base
/// URL the page number is appended to.
fn city_scopes(scope: &CrawlScope, html: &str) -> Result<Vec<CrawlScope>, ExtractError> {
    let document = Html::parse_document(html);
    let container = document
        .select(&sel("main#main"))
        .next()
        .and_then(|main| main.select(&sel(CITY_LIST_CONTAINER)).next())
        .ok_or(ExtractError::MissingElement("city list"))?;

    let mut scopes = Vec::new();
    for city in container.select(&sel("li")) {
        let Some(href) = city
            .select(&sel("a"))
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let slug = href.trim_matches('/').rsplit('/').next().unwrap_or(href);
        scopes.push(CrawlScope {
            name: format!("{}/{}", scope.name, slug),
            param: absolutize(ORIGIN, href),
            prefecture: scope.prefecture,
        });
    }
    Ok(scopes)
}

/// Building-level fields shared by every unit row in the block.
fn building_fields(building: ElementRef) -> DraftFields {
    let mut fields = DraftFields::default();
    fields.property_type = Some(FieldText::Final("Rental".to_string()));

    fields.description = building
        .select(&sel("h2"))
        .next()
        .and_then(|h| FieldText::raw(text_of(h)));

    if let Some(info) = building.select(&sel(LOCATION_BOX)).next() {
        let rows: Vec<String> = info
            .select(&sel("div.box.is-flex"))
            .map(text_of)
            .collect();
        if rows.len() >= 2 {
            fields.transportation = FieldText::raw(rows[0].clone());
            fields.location = FieldText::raw(rows[1].clone());
        }
    }

    if let Some(info) = building.select(&sel(BUILDING_INFO)).next() {
        let values: Vec<String> = info
            .select(&sel("dl dd"))
            .map(text_of)
            .collect();
        // Floors, age, structure, in document order.
        if let [floors, age, structure] = values.as_slice() {
            fields.construction_date = FieldText::raw(age.clone());
            fields.structure = FieldText::raw(format!("{structure} / {floors}"));
        }
    }

    fields
}

/// Per-unit columns: floor plan, floor area, rent and the unit photo.
fn unit_fields(unit: ElementRef, fields: &mut DraftFields, image_urls: &mut Vec<String>) {
    let Some(row) = unit.select(&sel("tr")).next() else {
        return;
    };
    let cells: Vec<ElementRef> = row.select(&sel("td")).collect();

    if let Some(photo) = cells.get(1) {
        if let Some(src) = photo
            .select(&sel("img"))
            .next()
            .and_then(|img| img.value().attr("data-src"))
        {
            image_urls.push(src.to_string());
        }
    }

    if let Some(plan_cell) = cells.get(3) {
        // Floor plan and area are already notation, not prose.
        let texts: Vec<String> = plan_cell.select(&sel("p")).map(text_of).collect();
        if let Some(plan) = texts.first().filter(|t| !t.is_empty()) {
            fields.layout = Some(FieldText::Final(plan.clone()));
        }
        if let Some(area) = texts.get(1).filter(|t| !t.is_empty()) {
            fields.building_area = Some(FieldText::Final(area.clone()));
        }
    }

    if let Some(rent_cell) = cells.get(4) {
        fields.price = rent_cell
            .select(&sel(RENT_VALUE))
            .next()
            .and_then(|p| FieldText::raw(text_of(p)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CITY_PAGE: &str = r#"
    <html><body><main id="main">
      <div data-contents-id="search-condition-city">
        <ul>
          <li><a href="/rent/tokyo/shibuya-city/">渋谷区</a></li>
          <li><a href="/rent/tokyo/setagaya-city/">世田谷区</a></li>
          <li><span>準備中</span></li>
        </ul>
      </div>
    </main></body></html>"#;

    const INDEX_PAGE: &str = r#"
    <html><body>
      <ul class="box is-space-sm">
        <li>
          <h2>コーポ青山</h2>
          <div class="box is-mobile-0 is-space-sm">
            <div class="box is-flex">山手線 渋谷駅 徒歩5分</div>
            <div class="box is-flex">東京都渋谷区神南1丁目</div>
          </div>
          <div class="bukken-info-items is-flex">
            <dl><dt>階建</dt><dd>3階建</dd></dl>
            <dl><dt>築年数</dt><dd>築12年</dd></dl>
            <dl><dt>構造</dt><dd>木造</dd></dl>
          </div>
          <div class="thumbnail-wrap is-contain is-width-200px is-4x3">
            <img class="lazyload thumbnail" data-src="https://img.nifty/main.jpg">
          </div>
          <table class="result-bukken-table">
            <tbody>
              <tr>
                <td><a href="/rent/detail/101/">詳細</a></td>
                <td><img data-src="https://img.nifty/unit101.jpg"></td>
                <td>2階</td>
                <td><p>1LDK</p><p>40.5m²</p></td>
                <td><p class="text is-strong">8.2万円</p></td>
              </tr>
              <tr><td>backmatter</td></tr>
              <tr><td>backmatter</td></tr>
            </tbody>
            <tbody>
              <tr>
                <td><a href="/rent/detail/102/">詳細</a></td>
                <td></td>
                <td>3階</td>
                <td><p>2DK</p><p>52.0m²</p></td>
                <td><p class="text is-strong">9.6万円</p></td>
              </tr>
              <tr><td>backmatter</td></tr>
              <tr><td>backmatter</td></tr>
            </tbody>
          </table>
        </li>
      </ul>
    </body></html>"#;

    #[test]
    fn city_list_expands_into_absolute_page_scopes() {
        let base = CrawlScope {
            name: "tokyo".to_string(),
            param: "tokyo".to_string(),
            prefecture: Some("tokyo"),
        };
        let scopes = city_scopes(&base, CITY_PAGE).unwrap();
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[0].name, "tokyo/shibuya-city");
        assert_eq!(
            scopes[0].param,
            "https://myhome.nifty.com/rent/tokyo/shibuya-city/"
        );
        assert_eq!(scopes[0].prefecture, Some("tokyo"));

        let url = NiftyRentalAdapter.page_url(&scopes[1], 3);
        assert_eq!(
            url,
            "https://myhome.nifty.com/rent/tokyo/setagaya-city/3/?sort=regDate-desc"
        );
    }

    #[test]
    fn missing_city_list_is_a_page_error() {
        let base = CrawlScope {
            name: "tokyo".to_string(),
            param: "tokyo".to_string(),
            prefecture: Some("tokyo"),
        };
        let err = city_scopes(&base, "<html><body></body></html>").unwrap_err();
        assert!(matches!(err, ExtractError::MissingElement(_)));
    }

    #[test]
    fn unit_rows_fan_out_with_shared_building_fields() {
        let blocks = NiftyRentalAdapter.parse_index(INDEX_PAGE).unwrap();
        assert_eq!(blocks.len(), 2);

        let first = &blocks[0];
        assert_eq!(first.link, "https://myhome.nifty.com/rent/detail/101/");
        assert_eq!(
            first.fields.property_type,
            Some(FieldText::Final("Rental".to_string()))
        );
        assert_eq!(first.fields.description, FieldText::raw("コーポ青山"));
        assert_eq!(
            first.fields.transportation,
            FieldText::raw("山手線 渋谷駅 徒歩5分")
        );
        assert_eq!(first.fields.location, FieldText::raw("東京都渋谷区神南1丁目"));
        assert_eq!(first.fields.construction_date, FieldText::raw("築12年"));
        assert_eq!(first.fields.structure, FieldText::raw("木造 / 3階建"));
        assert_eq!(
            first.fields.layout,
            Some(FieldText::Final("1LDK".to_string()))
        );
        assert_eq!(
            first.fields.building_area,
            Some(FieldText::Final("40.5m²".to_string()))
        );
        assert_eq!(first.fields.price, FieldText::raw("8.2万円"));
        // Building photo first, then the unit photo.
        assert_eq!(
            first.image_urls,
            vec![
                "https://img.nifty/main.jpg".to_string(),
                "https://img.nifty/unit101.jpg".to_string()
            ]
        );

        // The second unit shares the building fields but not the photo.
        let second = &blocks[1];
        assert_eq!(second.link, "https://myhome.nifty.com/rent/detail/102/");
        assert_eq!(second.fields.structure, FieldText::raw("木造 / 3階建"));
        assert_eq!(second.fields.price, FieldText::raw("9.6万円"));
        assert_eq!(second.image_urls, vec!["https://img.nifty/main.jpg".to_string()]);
    }

    #[test]
    fn rental_records_have_no_detail_pages() {
        assert!(!NiftyRentalAdapter.has_detail_pages());
        assert!(NiftyRentalAdapter.fast_backoff());
        let detail = NiftyRentalAdapter.parse_detail("x", "y").unwrap();
        assert!(detail.contact_number.is_none());
        assert!(detail.image_urls.is_empty());
    }
}
