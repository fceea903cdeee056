//! Sumai adapter: a single national feed of akiya-bank sale listings.
//! The index page is a blog-style archive whose entries carry only the
//! detail link; every field comes from the detail page's labelled table,
//! so the table labels are the schema-change tripwire here.

use scraper::Html;
use tracing::warn;

use super::{dedupe_urls, sel, text_of, SiteAdapter};
use crate::error::ExtractError;
use crate::models::{
    CrawlScope, DetailPage, DraftFields, DuplicatePolicy, FieldText, IndexBlock, Site,
};
use crate::translate::table_field_english;

const BASE_URL: &str =
    "https://akiya.sumai.biz/category/%E5%A3%B2%E8%B2%B7%E4%BE%A1%E6%A0%BC%E5%B8%AF/page/{page}";

pub struct SumaiAdapter;

impl SiteAdapter for SumaiAdapter {
    fn site(&self) -> Site {
        Site::Sumai
    }

    fn duplicate_policy(&self) -> DuplicatePolicy {
        // The archive lists newest posts first.
        DuplicatePolicy::StopScope
    }

    fn scopes(&self) -> Vec<CrawlScope> {
        // One nationwide feed, no prefecture segmentation.
        CrawlScope::unit()
    }

    fn page_url(&self, _scope: &CrawlScope, page: u32) -> String {
        BASE_URL.replace("{page}", &page.to_string())
    }

    fn parse_index(&self, html: &str) -> Result<Vec<IndexBlock>, ExtractError> {
        let document = Html::parse_document(html);
        let content = document
            .select(&sel("#content"))
            .next()
            .ok_or(ExtractError::MissingElement("content"))?;

        let mut blocks = Vec::new();
        for article in content.select(&sel("article")) {
            let link = article
                .select(&sel("header.entry-header h1.entry-title a"))
                .next()
                .and_then(|a| a.value().attr("href"));
            let Some(link) = link else {
                warn!("sumai article without title link, skipping");
                continue;
            };
            blocks.push(IndexBlock {
                link: link.to_string(),
                fields: DraftFields::default(),
                image_urls: Vec::new(),
            });
        }
        Ok(blocks)
    }

    fn parse_detail(&self, _link: &str, html: &str) -> Result<DetailPage, ExtractError> {
        let document = Html::parse_document(html);
        let header = document
            .select(&sel("header.entry-header"))
            .next()
            .ok_or(ExtractError::MissingElement("entry header"))?;

        let mut fields = DraftFields::default();
        fields.description = header
            .select(&sel("h1.entry-title"))
            .next()
            .and_then(|title| FieldText::raw(text_of(title)));

        let mut contact_number = None;
        for row in document.select(&sel("div.entry-content table tr")) {
            let cells: Vec<String> = row.select(&sel("td")).map(|td| text_of(td)).collect();
            // Rows pack two label/value pairs side by side.
            for pair in cells.chunks(2) {
                let [label, value] = pair else { continue };
                if label.is_empty() || value.is_empty() {
                    continue;
                }
                let slot = match table_field_english(label)? {
                    "Property Type" => &mut fields.property_type,
                    "Sale Price" | "Rental Price" => &mut fields.price,
                    "Property Location" => &mut fields.location,
                    "Transportation" => &mut fields.transportation,
                    "Building - Structure" => &mut fields.structure,
                    "Building - Construction Date" => &mut fields.construction_date,
                    "Building - Area" => &mut fields.building_area,
                    "Building - Layout" => &mut fields.layout,
                    "Land - Area" => &mut fields.land_area,
                    "Business Contact" => {
                        contact_number = Some(value.clone());
                        continue;
                    }
                    // Land-use, utilities and the clerical rows have no
                    // column in the record.
                    _ => continue,
                };
                *slot = FieldText::raw(value.clone());
            }
        }

        let image_urls = document
            .select(&sel("div.image50 div"))
            .filter_map(|cell| {
                cell.select(&sel("a"))
                    .next()
                    .and_then(|a| a.value().attr("href"))
            })
            .map(str::to_string)
            .collect();

        Ok(DetailPage {
            fields,
            contact_number,
            image_urls: dedupe_urls(image_urls),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_collects_article_links() {
        let html = r#"
        <html><body><div id="content">
          <article>
            <header class="entry-header">
              <h1 class="entry-title"><a href="https://akiya.sumai.biz/?p=100">北海道の物件</a></h1>
            </header>
          </article>
          <article>
            <header class="entry-header"><h1 class="entry-title">リンクなし</h1></header>
          </article>
          <article>
            <header class="entry-header">
              <h1 class="entry-title"><a href="https://akiya.sumai.biz/?p=101">青森の物件</a></h1>
            </header>
          </article>
        </div></body></html>"#;

        let blocks = SumaiAdapter.parse_index(html).unwrap();
        let links: Vec<&str> = blocks.iter().map(|b| b.link.as_str()).collect();
        assert_eq!(
            links,
            vec!["https://akiya.sumai.biz/?p=100", "https://akiya.sumai.biz/?p=101"]
        );
        assert!(blocks[0].fields.price.is_none());
    }

    #[test]
    fn detail_maps_paired_table_cells() {
        let html = r#"
        <html><body>
        <header class="entry-header"><h1 class="entry-title">古民家 300万円</h1></header>
        <div class="entry-content">
          <table>
            <tr><td>物件種別</td><td>中古一戸建て</td><td>売買価格</td><td>300万円</td></tr>
            <tr><td>物件所在地</td><td>長野県松本市</td><td>交通</td><td>松本駅 バス20分</td></tr>
            <tr><td>建物-面積</td><td>120m²</td><td>土地-面積</td><td>250m²</td></tr>
            <tr><td>事業者連絡先</td><td>0263-00-0000</td><td>備考</td><td>現状渡し</td></tr>
            <tr><td>利用状況</td><td></td></tr>
          </table>
        </div>
        <div class="image50">
          <div><a href="https://akiya.sumai.biz/img/a.jpg"><img src="t.jpg"></a></div>
          <div><a href="https://akiya.sumai.biz/img/b.jpg"><img src="t2.jpg"></a></div>
        </div>
        </body></html>"#;

        let detail = SumaiAdapter
            .parse_detail("https://akiya.sumai.biz/?p=100", html)
            .unwrap();
        assert_eq!(detail.fields.description, FieldText::raw("古民家 300万円"));
        assert_eq!(detail.fields.property_type, FieldText::raw("中古一戸建て"));
        assert_eq!(detail.fields.price, FieldText::raw("300万円"));
        assert_eq!(detail.fields.location, FieldText::raw("長野県松本市"));
        assert_eq!(detail.fields.building_area, FieldText::raw("120m²"));
        assert_eq!(detail.fields.land_area, FieldText::raw("250m²"));
        assert_eq!(detail.contact_number.as_deref(), Some("0263-00-0000"));
        assert_eq!(
            detail.image_urls,
            vec!["https://akiya.sumai.biz/img/a.jpg", "https://akiya.sumai.biz/img/b.jpg"]
        );
    }

    #[test]
    fn unknown_table_label_fails_loudly() {
        let html = r#"
        <header class="entry-header"><h1 class="entry-title">x</h1></header>
        <div class="entry-content"><table>
          <tr><td>新しい項目</td><td>値</td></tr>
        </table></div>"#;
        let err = SumaiAdapter
            .parse_detail("https://akiya.sumai.biz/?p=1", html)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Schema(_)));
    }
}
