//! Decoding asset identity from detail-page URLs.

use crate::types::{AnchorSnapshot, Asset, AssetPageUrlElements};

/// Minimum number of `/`-separated segments an asset URL must exceed.
const MIN_SEGMENTS: usize = 3;

/// Split an asset URL into `{chain, contract_address, asset_id}`.
///
/// The last three `/`-separated segments are read back to front: token id,
/// contract address, chain. Segment contents are not validated, so any
/// string with more than three segments yields a value. Returns `None`
/// otherwise.
///
/// ```
/// use collection_scraper::parse_asset_url;
///
/// let parts = parse_asset_url("https://site/assets/matic/0xABC/16").unwrap();
/// assert_eq!(parts.chain, "matic");
/// assert_eq!(parts.contract_address, "0xABC");
/// assert_eq!(parts.asset_id, "16");
///
/// assert!(parse_asset_url("a/b/c").is_none());
/// ```
pub fn parse_asset_url(url: &str) -> Option<AssetPageUrlElements> {
    let segments: Vec<&str> = url.split('/').collect();
    if segments.len() <= MIN_SEGMENTS {
        return None;
    }

    let mut tail = segments.iter().rev();
    let asset_id = tail.next()?;
    let contract_address = tail.next()?;
    let chain = tail.next()?;

    Some(AssetPageUrlElements {
        chain: (*chain).to_string(),
        contract_address: (*contract_address).to_string(),
        asset_id: (*asset_id).to_string(),
    })
}

/// Build an [`Asset`] from an anchor snapshot.
///
/// Name and image come from the nested image (`alt` and `src`), falling
/// back to empty strings. Returns `None` when the href does not parse.
pub fn asset_from_anchor(anchor: &AnchorSnapshot) -> Option<Asset> {
    let elements = parse_asset_url(&anchor.href)?;
    let (image_url, asset_name) = match &anchor.image {
        Some(img) => (img.src.clone(), img.alt.clone()),
        None => (String::new(), String::new()),
    };

    Some(Asset {
        image_url,
        asset_name,
        asset_id: elements.asset_id,
        contract_address: elements.contract_address,
        chain: elements.chain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnchorImage;

    #[test]
    fn parses_reference_url() {
        let parts = parse_asset_url("https://site/assets/matic/0xABC/16").unwrap();
        assert_eq!(
            parts,
            AssetPageUrlElements {
                chain: "matic".into(),
                contract_address: "0xABC".into(),
                asset_id: "16".into(),
            }
        );
    }

    #[test]
    fn three_or_fewer_segments_is_no_match() {
        for url in ["", "16", "0xABC/16", "matic/0xABC/16", "/a/b", "//"] {
            assert!(parse_asset_url(url).is_none(), "{url:?} should not parse");
        }
    }

    #[test]
    fn four_segments_is_enough() {
        let parts = parse_asset_url("x/matic/0xABC/16").unwrap();
        assert_eq!(parts.chain, "matic");
        assert_eq!(parts.asset_id, "16");
    }

    #[test]
    fn garbage_segments_pass_through() {
        let parts = parse_asset_url("///").unwrap();
        assert_eq!(parts.chain, "");
        assert_eq!(parts.contract_address, "");
        assert_eq!(parts.asset_id, "");

        let parts = parse_asset_url("https://site/assets/ethereum/not-hex/").unwrap();
        assert_eq!(parts.contract_address, "not-hex");
        assert_eq!(parts.asset_id, "");
    }

    #[test]
    fn never_panics_on_odd_input() {
        let long = "a/".repeat(10_000);
        for url in ["🦀/🦀/🦀/🦀", "\0/\n/\t/ ", long.as_str()] {
            let _ = parse_asset_url(url);
        }
    }

    #[test]
    fn anchor_with_image_fills_name_and_url() {
        let anchor = AnchorSnapshot {
            href: "https://site/assets/klaytn/0xdef/99".into(),
            image: Some(AnchorImage {
                src: "https://cdn/99.png".into(),
                alt: "Meta Kongz #99".into(),
            }),
        };
        let asset = asset_from_anchor(&anchor).unwrap();

        assert_eq!(asset.asset_name, "Meta Kongz #99");
        assert_eq!(asset.image_url, "https://cdn/99.png");
        assert_eq!(asset.chain, "klaytn");
        assert_eq!(asset.contract_address, "0xdef");
        assert_eq!(asset.asset_id, "99");
    }

    #[test]
    fn anchor_without_image_gets_empty_strings() {
        let anchor = AnchorSnapshot {
            href: "https://site/assets/matic/0xABC/16".into(),
            image: None,
        };
        let asset = asset_from_anchor(&anchor).unwrap();
        assert_eq!(asset.asset_name, "");
        assert_eq!(asset.image_url, "");
    }

    #[test]
    fn anchor_with_short_href_is_skipped() {
        let anchor = AnchorSnapshot {
            href: "/collection".into(),
            image: None,
        };
        assert!(asset_from_anchor(&anchor).is_none());
    }
}
