use crate::detection::ocr::PageTextReport;
use crate::models::PageKey;

pub trait OcrRepository {
    /// Store the report for a page, replacing an earlier one.
    fn save_page_report(&self, key: &PageKey, report: &PageTextReport) -> impl Future<Output = anyhow::Result<()>>;
    fn page_reports(&self) -> impl Future<Output = anyhow::Result<Vec<(PageKey, PageTextReport)>>>;
}
