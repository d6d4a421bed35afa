//! Store name, address, and tag guessing over the Korean fragments.
//!
//! Each field is resolved by an ordered list of independent matchers; the
//! first one to return `Some` wins. Matchers take the rendered fragment
//! strings (title first) and never fail.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ExtractedFields;

/// A single extraction rule.
pub type Matcher = fn(&[String]) -> Option<String>;

/// Paragraph that introduces the address on the following line.
pub const LOCATION_MARKER: &str = "위치";

/// Korean administrative district suffix ("-gu").
pub const DISTRICT_MARKER: char = '구';

static STORE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#\s*([^\s#]+)").unwrap());
static LABELED_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(주소|위치)[:：]?\s*([^\n]+)").unwrap());
static BARE_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([가-힣]+시)? ?([가-힣]+구) ?([가-힣]+동)? ?[0-9\-]+").unwrap()
});
static TITLE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\[\]]+)\]").unwrap());
static HASH_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#([^\s#\[\]]+)").unwrap());

pub const STORE_MATCHERS: &[Matcher] = &[hashtag_store];

pub const ADDRESS_MATCHERS: &[Matcher] =
    &[line_after_location_marker, labeled_address, bare_address];

/// The first fragment starting with `#name` gives the store name.
pub fn hashtag_store(fragments: &[String]) -> Option<String> {
    fragments.iter().find_map(|text| {
        STORE_TAG
            .captures(text)
            .map(|caps| caps[1].trim().to_string())
    })
}

/// A "위치" paragraph followed by a line naming a district.
pub fn line_after_location_marker(fragments: &[String]) -> Option<String> {
    fragments
        .iter()
        .tuple_windows()
        .find_map(|(marker, next)| {
            let candidate = next.trim();
            (marker.contains(LOCATION_MARKER) && candidate.contains(DISTRICT_MARKER))
                .then(|| candidate.to_string())
        })
}

/// `주소: ...` / `위치: ...` with a district in the value.
pub fn labeled_address(fragments: &[String]) -> Option<String> {
    fragments.iter().find_map(|text| {
        let caps = LABELED_ADDRESS.captures(text)?;
        let value = caps[2].trim();
        value
            .contains(DISTRICT_MARKER)
            .then(|| value.to_string())
    })
}

/// A bare `시 구 동 번지` run anywhere in the text.
pub fn bare_address(fragments: &[String]) -> Option<String> {
    fragments
        .iter()
        .find_map(|text| BARE_ADDRESS.find(text).map(|m| m.as_str().trim().to_string()))
}

/// Run `matchers` in order and return the first hit.
pub fn first_match(matchers: &[Matcher], fragments: &[String]) -> Option<String> {
    matchers.iter().find_map(|matcher| matcher(fragments))
}

/// Guess the store name and address of a post.
pub fn extract_fields(fragments: &[String]) -> ExtractedFields {
    ExtractedFields {
        store_name: first_match(STORE_MATCHERS, fragments),
        address: first_match(ADDRESS_MATCHERS, fragments),
    }
}

/// Tags from `[bracketed]` title words and `#hashtags` in the body,
/// de-duplicated in first-seen order.
pub fn extract_tags(title: &str, fragments: &[String]) -> Vec<String> {
    let from_title = TITLE_TAG
        .captures_iter(title)
        .map(|caps| caps[1].trim().to_string());
    let from_body = fragments
        .iter()
        .flat_map(|text| HASH_TAG.captures_iter(text))
        .map(|caps| caps[1].trim().to_string());

    from_title
        .chain(from_body)
        .filter(|tag| !tag.is_empty())
        .unique()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| format!("{s}\n\n")).collect()
    }

    #[test]
    fn test_store_from_hashtag() {
        let fragments = frags(&["제목", "#연남토마 파스타", "#두번째"]);
        assert_eq!(hashtag_store(&fragments).as_deref(), Some("연남토마"));
        assert_eq!(hashtag_store(&frags(&["해시 #없음"])), None);
    }

    #[test]
    fn test_address_after_location_marker() {
        let fragments = frags(&["◈ 위치", "서울 마포구 동교로46길 40", "영업시간"]);
        assert_eq!(
            line_after_location_marker(&fragments).as_deref(),
            Some("서울 마포구 동교로46길 40")
        );
        assert_eq!(
            line_after_location_marker(&frags(&["◈ 위치", "역에서 도보 5분"])),
            None
        );
    }

    #[test]
    fn test_labeled_address() {
        let fragments = frags(&["주소: 서울 강남구 테헤란로 1"]);
        assert_eq!(
            labeled_address(&fragments).as_deref(),
            Some("서울 강남구 테헤란로 1")
        );
        assert_eq!(labeled_address(&frags(&["위치： 역 앞"])), None);
    }

    #[test]
    fn test_bare_address() {
        let fragments = frags(&["여기는 서울시 마포구 연남동 239-1 에 있어요"]);
        assert_eq!(
            bare_address(&fragments).as_deref(),
            Some("서울시 마포구 연남동 239-1")
        );
    }

    #[test]
    fn test_priority_order() {
        let fragments = frags(&[
            "#가게",
            "주소: 서울 종로구 1",
            "◈ 위치",
            "서울 마포구 동교로 2",
        ]);
        let fields = extract_fields(&fragments);
        assert_eq!(fields.store_name.as_deref(), Some("가게"));
        assert_eq!(fields.address.as_deref(), Some("서울 마포구 동교로 2"));
    }

    #[test]
    fn test_no_match_yields_none_label() {
        let fields = extract_fields(&frags(&["그냥 글", "사진"]));
        assert_eq!(fields.label(), "None, None");
        assert_eq!(extract_fields(&[]).label(), "None, None");
    }

    #[test]
    fn test_extraction_is_pure() {
        let fragments = frags(&["#가게", "◈ 위치", "서울 마포구 동교로 2"]);
        assert_eq!(extract_fields(&fragments), extract_fields(&fragments));
    }

    #[test]
    fn test_tags_always_list() {
        assert!(extract_tags("Test Title", &frags(&["본문1", "본문2"])).is_empty());
        let tags = extract_tags(
            "[연남] Test Title",
            &frags(&["#맛집 본문1", "[연남] 본문2", "#맛집 #파스타"]),
        );
        assert_eq!(tags, vec!["연남", "맛집", "파스타"]);
    }
}
