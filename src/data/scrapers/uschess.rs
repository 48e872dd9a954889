//! US Chess Federation page layouts
//!
//! URL builders and parsers for the club detail page, the active player
//! list, the head-to-head ("game statistics") page and the member lookup page.

use crate::head_to_head::game::GameRow;
use crate::{ChessError, Player, PlayerId, Result};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};

pub const BASE_URL: &str = "https://www.uschess.org";

/// Club detail page
pub fn club_url(club_id: &str) -> String {
    format!("{}/msa/AffDtlMain.php?{}", BASE_URL, club_id)
}

/// Lifetime games of `player_id` against `opponent_id`, from `player_id`'s side
pub fn head_to_head_url(player_id: &PlayerId, opponent_id: &PlayerId) -> String {
    format!(
        "{}/datapage/gamestats.php?memid={}&ptype=0&rs=R&drill={}",
        BASE_URL, player_id, opponent_id
    )
}

/// Member lookup page, used to find a name from an id
pub fn member_lookup_url(player_id: &PlayerId) -> String {
    format!("{}/msa/thin.php?{}", BASE_URL, player_id)
}

/// Roster URL filtered to players with at least `min_games` games at the club
pub fn active_players_url(roster_href: &str, min_games: u32) -> String {
    let sep = if roster_href.contains('?') { '&' } else { '?' };
    format!("{}{}min={}&Search=Submit", roster_href, sep, min_games)
}

/// What the club detail page tells us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClubPage {
    pub name: String,
    /// Unfiltered "Active Player List" link, possibly relative
    pub roster_href: String,
}

/// Results table of a head-to-head page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadToHeadPage {
    /// Name of the player whose page this is
    pub player_name: Option<String>,
    pub rows: Vec<GameRow>,
}

/// Parse the club detail page. Club details live in the third table.
pub fn extract_club(html: &str) -> Result<ClubPage> {
    let document = Html::parse_document(html);
    let table_selector = Selector::parse("table").unwrap();
    let font_selector = Selector::parse(r#"font[size="+1"]"#).unwrap();
    let link_selector = Selector::parse("a").unwrap();

    let tables: Vec<_> = document.select(&table_selector).collect();
    if tables.len() < 3 {
        return Err(ChessError::malformed(
            "club",
            format!("expected at least 3 tables, found {}", tables.len()),
        ));
    }
    let main_table = tables[2];

    let heading = main_table
        .select(&font_selector)
        .next()
        .ok_or_else(|| ChessError::malformed("club", "no <font size=+1> tag found"))?;
    let name = club_name(&text_of(&heading))?;

    let roster_href = main_table
        .select(&link_selector)
        .find(|a| text_of(a) == "Active Player List")
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .ok_or_else(|| ChessError::malformed("club", "no Active Player List link"))?;

    Ok(ClubPage { name, roster_href })
}

/// Club headings read `A6021250: CLUB NAME`
fn club_name(heading: &str) -> Result<String> {
    let (_, name) = heading
        .split_once(':')
        .ok_or_else(|| ChessError::malformed("club", format!("unexpected heading '{}'", heading)))?;
    Ok(name.trim().to_string())
}

/// Parse the active player list: the first table after the first `<h4>`
pub fn extract_roster(html: &str) -> Result<Vec<Player>> {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("tr").unwrap();

    let mut seen_heading = false;
    let table = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| match el.value().name() {
            "h4" => {
                seen_heading = true;
                false
            }
            "table" => seen_heading,
            _ => false,
        })
        .ok_or_else(|| ChessError::malformed("roster", "no player table after <h4>"))?;

    let mut players = Vec::new();
    // First row is column headings
    for row in table.select(&row_selector).skip(1) {
        let cells = child_cells(&row);
        if cells.is_empty() {
            continue;
        }
        players.push(parse_player(&cells)?);
    }

    log::debug!("Parsed {} players from roster", players.len());
    Ok(players)
}

/// Columns: #, id, expiry, name, state, rating, rating date, events, last event
fn parse_player(cells: &[ElementRef]) -> Result<Player> {
    if cells.len() < 9 {
        return Err(ChessError::malformed(
            "roster",
            format!("expected 9 cells in player row, found {}", cells.len()),
        ));
    }
    let texts: Vec<String> = cells.iter().map(text_of).collect();

    let id = texts[1].clone();
    if id.is_empty() {
        return Err(ChessError::malformed("roster", "player row without an id"));
    }

    Ok(Player {
        id: PlayerId(id),
        name: texts[3].clone(),
        state: non_empty(&texts[4]),
        rating: leading_number(&texts[5]),
        rating_date: NaiveDate::parse_from_str(&texts[6], "%Y-%m-%d").ok(),
        event_count: leading_number(&texts[7]),
        last_event: non_empty(&texts[8]),
    })
}

/// Parse a head-to-head page.
///
/// Returns `None` when the page has no results table, which is how the site
/// shows a pair that has never played.
pub fn extract_head_to_head(html: &str) -> Result<Option<HeadToHeadPage>> {
    let document = Html::parse_document(html);
    let th_selector = Selector::parse("th").unwrap();
    let td_selector = Selector::parse("td").unwrap();
    let link_selector = Selector::parse("a").unwrap();

    let Some(header) = document
        .select(&th_selector)
        .find(|th| text_of(th).contains("Event Name"))
    else {
        return Ok(None);
    };

    let player_name = document
        .select(&td_selector)
        .find(|td| text_of(td) == "Name")
        .and_then(|td| next_element(&td, "td"))
        .map(|td| text_of(&td));

    let header_row = header
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "tr")
        .ok_or_else(|| ChessError::malformed("head-to-head", "results header outside a row"))?;

    let mut rows = Vec::new();
    let following = header_row
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "tr");

    for tr in following {
        let cells = child_cells(&tr);
        let Some(first) = cells.first() else {
            break;
        };
        // Table ends with a "Search for ..." row
        if text_of(first).starts_with("Search for") {
            break;
        }
        if cells.len() < 8 {
            return Err(ChessError::malformed(
                "head-to-head",
                format!("expected 8 cells in game row, found {}", cells.len()),
            ));
        }

        rows.push(GameRow {
            event_name: text_of(&cells[0]),
            event_href: cells[0]
                .select(&link_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| href.trim().to_string()),
            section: text_of(&cells[1]),
            round: text_of(&cells[2]),
            color: text_of(&cells[3]),
            opponent_id: text_of(&cells[4]),
            opponent_name: text_of(&cells[5]),
            rating: text_of(&cells[6]),
            result: text_of(&cells[7]),
        });
    }

    Ok(Some(HeadToHeadPage { player_name, rows }))
}

/// Member name from the lookup page's `memname` field
pub fn extract_member_name(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let input_selector = Selector::parse(r#"input[name="memname"]"#).unwrap();

    document
        .select(&input_selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Text of an element with runs of whitespace collapsed
fn text_of(el: &ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `<td>` children of a row (not cells of nested tables)
fn child_cells<'a>(row: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .collect()
}

fn next_element<'a>(el: &ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    el.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sibling| sibling.value().name() == name)
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Ratings may carry suffixes like `1500P12` or `2020/2035`
fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
