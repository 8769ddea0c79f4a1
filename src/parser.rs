use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};

use crate::types::Bill;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Failed to parse date: {0}")]
    DateParse(String),
    #[error("Failed to parse price: {0}")]
    PriceParse(String),
}

// The current-bill header reads "Votre facture du <date>"; the leading
// label is a fixed 17 characters.
const CURRENT_BILL_LABEL_LEN: usize = 17;

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Value of the hidden `lt` input the CAS login form embeds, if any.
/// Returned verbatim, as the portal expects it echoed back unchanged.
pub fn parse_login_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let token_selector = Selector::parse("input[name='lt']").unwrap();
    document
        .select(&token_selector)
        .next()
        .and_then(|e| e.value().attr("value"))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The portal re-renders the login form on rejected credentials, so the
/// presence of its `#username` field after the POST means the login failed.
pub fn login_was_rejected(html: &str) -> bool {
    let document = Html::parse_document(html);
    let username_selector = Selector::parse("#username").unwrap();
    document.select(&username_selector).next().is_some()
}

/// Extracts every downloadable bill from the consultation page, in
/// document order: the dedicated current-bill block first, then the
/// history table rows.
///
/// `default_year` fills in the year when the current-bill header omits
/// it (the portal drops it for the running year).
pub fn parse_bills(html: &str, default_year: i32) -> Result<Vec<Bill>, ParseError> {
    let document = Html::parse_document(html);
    let mut bills = Vec::new();

    parse_current_bill(&document, default_year, &mut bills)?;
    parse_history_rows(&document, default_year, &mut bills)?;

    Ok(bills)
}

fn parse_current_bill(
    document: &Html,
    default_year: i32,
    bills: &mut Vec<Bill>,
) -> Result<(), ParseError> {
    let link_selector = Selector::parse("#lien-telecharger-pdf").unwrap();
    let header_selector = Selector::parse("#facture tr.header h3").unwrap();
    let price_selector = Selector::parse("#facture tr.total td.prix").unwrap();

    let href = document
        .select(&link_selector)
        .next()
        .and_then(|e| e.value().attr("href"))
        .filter(|h| !h.is_empty());

    let Some(href) = href else {
        log::info!("No download link on the current bill block, skipping it");
        return Ok(());
    };

    let header_text = document
        .select(&header_selector)
        .next()
        .map(elem_text)
        .unwrap_or_default();
    let date_text: String = normalize_whitespace(&header_text)
        .chars()
        .skip(CURRENT_BILL_LABEL_LEN)
        .collect();
    let price_text = document
        .select(&price_selector)
        .next()
        .map(elem_text)
        .unwrap_or_default();

    let date = parse_french_date(&date_text, default_year)?;
    let amount = parse_price(&price_text)?;

    bills.push(Bill::new(date, amount, absolute_url(href)));
    Ok(())
}

fn parse_history_rows(
    document: &Html,
    default_year: i32,
    bills: &mut Vec<Bill>,
) -> Result<(), ParseError> {
    let row_selector = Selector::parse("#tab tr").unwrap();
    let date_selector = Selector::parse(".date").unwrap();
    let price_selector = Selector::parse(".prix").unwrap();
    let link_selector = Selector::parse(".liens a").unwrap();

    for row in document.select(&row_selector) {
        let href = row
            .select(&link_selector)
            .next()
            .and_then(|e| e.value().attr("href"))
            .filter(|h| !h.is_empty());

        let Some(href) = href else {
            log::info!("No download link on a history row, skipping it");
            continue;
        };

        let date_text = row
            .select(&date_selector)
            .next()
            .map(elem_text)
            .unwrap_or_default();
        let price_text = row
            .select(&price_selector)
            .next()
            .map(elem_text)
            .unwrap_or_default();

        // The date cell carries a trailing weekday token that is not
        // part of the date.
        let date = parse_french_date(&strip_trailing_token(&date_text), default_year)?;
        let amount = parse_price(&price_text)?;

        bills.push(Bill::new(date, amount, absolute_url(href)));
    }

    Ok(())
}

fn absolute_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", crate::PORTAL_BASE_URL, href)
    }
}

fn strip_trailing_token(text: &str) -> String {
    let mut parts: Vec<&str> = text.split_whitespace().collect();
    parts.pop();
    parts.join(" ")
}

/// Parses "D MMM YYYY" with French month abbreviations, e.g. "3 janv. 2023".
/// A missing year resolves to `default_year`.
fn parse_french_date(text: &str, default_year: i32) -> Result<NaiveDate, ParseError> {
    let normalized = normalize_whitespace(text);
    let parts: Vec<&str> = normalized.split(' ').collect();

    if parts.len() < 2 || parts[0].is_empty() {
        return Err(ParseError::DateParse(normalized));
    }

    let day: u32 = parts[0]
        .parse()
        .map_err(|_| ParseError::DateParse(format!("Invalid day: {}", parts[0])))?;
    let month = parse_month(parts[1])?;
    let year: i32 = match parts.get(2) {
        Some(y) => y
            .parse()
            .map_err(|_| ParseError::DateParse(format!("Invalid year: {}", y)))?,
        None => default_year,
    };

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| ParseError::DateParse(format!("Invalid date: {} {} {}", day, month, year)))
}

fn parse_month(month: &str) -> Result<u32, ParseError> {
    let lowered = month.to_lowercase();
    match lowered.trim_end_matches('.') {
        "janv" | "janvier" => Ok(1),
        "févr" | "fevr" | "février" => Ok(2),
        "mars" => Ok(3),
        "avr" | "avril" => Ok(4),
        "mai" => Ok(5),
        "juin" => Ok(6),
        "juil" | "juillet" => Ok(7),
        "août" | "aout" => Ok(8),
        "sept" | "septembre" => Ok(9),
        "oct" | "octobre" => Ok(10),
        "nov" | "novembre" => Ok(11),
        "déc" | "dec" | "décembre" => Ok(12),
        _ => Err(ParseError::DateParse(format!("Unknown month: {}", month))),
    }
}

/// Parses "54,99€" style amounts: euro sign stripped, grouping spaces
/// dropped, decimal comma swapped for a dot.
fn parse_price(text: &str) -> Result<f64, ParseError> {
    let cleaned: String = text
        .replace('\u{20ac}', "")
        .replace(',', ".")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return Err(ParseError::PriceParse(normalize_whitespace(text)));
    }

    cleaned
        .parse()
        .map_err(|_| ParseError::PriceParse(normalize_whitespace(text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
            <form id="loginForm" method="post">
                <input type="text" id="username" name="username" />
                <input type="password" id="password" name="password" />
                <input type="hidden" name="lt" value="abc123" />
                <input type="hidden" name="execution" value="e1s1" />
            </form>
        </body></html>
    "#;

    #[test]
    fn login_token_is_extracted_verbatim() {
        assert_eq!(parse_login_token(LOGIN_PAGE), Some("abc123".to_string()));
    }

    #[test]
    fn missing_token_field_yields_none() {
        let html = "<html><body><form><input name='username' /></form></body></html>";
        assert_eq!(parse_login_token(html), None);
    }

    #[test]
    fn empty_token_value_yields_none() {
        let html = r#"<html><body><input name="lt" value="" /></body></html>"#;
        assert_eq!(parse_login_token(html), None);
    }

    #[test]
    fn rerendered_login_form_means_rejection() {
        assert!(login_was_rejected(LOGIN_PAGE));
        assert!(!login_was_rejected(
            "<html><body><h1>Bienvenue</h1></body></html>"
        ));
    }

    #[test]
    fn price_parsing_handles_comma_decimals() {
        assert_eq!(parse_price("54,99€").unwrap(), 54.99);
        assert_eq!(parse_price("42,50€").unwrap(), 42.5);
    }

    #[test]
    fn price_parsing_handles_grouped_thousands() {
        assert_eq!(parse_price("1 234,00€").unwrap(), 1234.0);
        // Non-breaking space as the grouping separator.
        assert_eq!(parse_price("1\u{a0}234,00€").unwrap(), 1234.0);
    }

    #[test]
    fn garbage_price_is_an_error() {
        assert!(parse_price("gratuit").is_err());
        assert!(parse_price("").is_err());
    }

    #[test]
    fn french_dates_parse() {
        assert_eq!(
            parse_french_date("3 janv. 2023", 2020).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 3).unwrap()
        );
        assert_eq!(
            parse_french_date("15 mars 2023", 2020).unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, 15).unwrap()
        );
        assert_eq!(
            parse_french_date("1 août 2022", 2020).unwrap(),
            NaiveDate::from_ymd_opt(2022, 8, 1).unwrap()
        );
    }

    #[test]
    fn yearless_date_takes_the_default_year() {
        assert_eq!(
            parse_french_date("15 mars", 2023).unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, 15).unwrap()
        );
    }

    #[test]
    fn trailing_weekday_token_is_stripped() {
        assert_eq!(strip_trailing_token("3 janv. 2023 lundi"), "3 janv. 2023");
        assert_eq!(
            parse_french_date(&strip_trailing_token("3 janv. 2023 lundi"), 2020).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 3).unwrap()
        );
    }

    fn billing_page(current_link: &str) -> String {
        format!(
            r#"
            <html><body>
                <div id="facture">
                    <table>
                        <tr class="header"><td><h3>Votre facture du 15 mars 2023</h3></td></tr>
                        <tr class="total"><td class="prix">42,50€</td></tr>
                    </table>
                </div>
                {current_link}
                <table id="tab">
                    <tr>
                        <td class="date">3 janv. 2023 mardi</td>
                        <td class="prix">54,99€</td>
                        <td class="liens"><a href="/facture-fixe/pdf?id=42">PDF</a></td>
                    </tr>
                    <tr>
                        <td class="date">3 déc. 2022 samedi</td>
                        <td class="prix">54,99€</td>
                        <td class="liens"></td>
                    </tr>
                </table>
            </body></html>
            "#
        )
    }

    #[test]
    fn full_page_yields_current_bill_then_linked_rows() {
        let html = billing_page(r#"<a id="lien-telecharger-pdf" href="/bill/1.pdf">PDF</a>"#);
        let bills = parse_bills(&html, 2023).unwrap();

        assert_eq!(bills.len(), 2);

        assert_eq!(bills[0].date, NaiveDate::from_ymd_opt(2023, 3, 15).unwrap());
        assert_eq!(bills[0].amount, 42.5);
        assert_eq!(
            bills[0].pdf_url,
            "https://espace-client.sfr.fr/bill/1.pdf"
        );
        assert_eq!(bills[0].kind, "Box");
        assert_eq!(bills[0].vendor, "Sfr");

        assert_eq!(bills[1].date, NaiveDate::from_ymd_opt(2023, 1, 3).unwrap());
        assert_eq!(bills[1].amount, 54.99);
        assert_eq!(
            bills[1].pdf_url,
            "https://espace-client.sfr.fr/facture-fixe/pdf?id=42"
        );
    }

    #[test]
    fn linkless_current_block_yields_no_current_record() {
        let html = billing_page("");
        let bills = parse_bills(&html, 2023).unwrap();

        // Only the linked history row survives.
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].date, NaiveDate::from_ymd_opt(2023, 1, 3).unwrap());
    }

    #[test]
    fn history_row_with_bad_price_is_fatal() {
        let html = r#"
            <html><body>
                <table id="tab">
                    <tr>
                        <td class="date">3 janv. 2023 mardi</td>
                        <td class="prix">offert</td>
                        <td class="liens"><a href="/facture-fixe/pdf?id=7">PDF</a></td>
                    </tr>
                </table>
            </body></html>
        "#;
        assert!(matches!(
            parse_bills(html, 2023),
            Err(ParseError::PriceParse(_))
        ));
    }

    #[test]
    fn history_row_with_bad_date_is_fatal() {
        let html = r#"
            <html><body>
                <table id="tab">
                    <tr>
                        <td class="date">bientôt disponible</td>
                        <td class="prix">54,99€</td>
                        <td class="liens"><a href="/facture-fixe/pdf?id=7">PDF</a></td>
                    </tr>
                </table>
            </body></html>
        "#;
        assert!(matches!(
            parse_bills(html, 2023),
            Err(ParseError::DateParse(_))
        ));
    }

    #[test]
    fn absolute_links_are_kept_as_is() {
        assert_eq!(
            absolute_url("https://cdn.sfr.fr/bill.pdf"),
            "https://cdn.sfr.fr/bill.pdf"
        );
        assert_eq!(
            absolute_url("/facture-fixe/pdf?id=1"),
            "https://espace-client.sfr.fr/facture-fixe/pdf?id=1"
        );
    }

    #[test]
    fn empty_page_yields_no_bills() {
        let bills = parse_bills("<html><body></body></html>", 2023).unwrap();
        assert!(bills.is_empty());
    }
}
