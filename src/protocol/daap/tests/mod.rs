use super::*;

fn listing_item() -> Vec<u8> {
    let mut inner = DmapEncoder::new();
    inner.string(DmapTag::ItemName, "Blue in Green");
    inner.string(DmapTag::SongArtist, "Miles Davis");
    inner.string(DmapTag::SongAlbum, "Kind of Blue");
    inner.raw(DmapTag::Unknown(*b"astn"), &[0, 3]);

    let mut outer = DmapEncoder::new();
    outer.container(DmapTag::ListingItem, inner);
    outer.finish()
}

#[test]
fn test_tag_codes_round_trip() {
    for tag in [
        DmapTag::ItemName,
        DmapTag::SongArtist,
        DmapTag::SongAlbum,
        DmapTag::SongGenre,
        DmapTag::SongComment,
        DmapTag::SongComposer,
        DmapTag::SongDescription,
        DmapTag::SortName,
        DmapTag::ListingItem,
    ] {
        assert_eq!(DmapTag::from_bytes(tag.code()), tag);
    }
    assert_eq!(DmapTag::from_bytes(*b"zzzz"), DmapTag::Unknown(*b"zzzz"));
    assert_eq!(DmapTag::SongGenre.to_string(), "asgn");
}

#[test]
fn test_parse_listing_item() {
    let items = DmapParser::parse(&listing_item()).unwrap();

    assert_eq!(items.len(), 1);
    let (tag, DmapValue::Container(inner)) = &items[0] else {
        panic!("expected container");
    };
    assert_eq!(*tag, DmapTag::ListingItem);
    assert_eq!(inner.len(), 4);
    assert_eq!(
        inner[0],
        (
            DmapTag::ItemName,
            DmapValue::Text("Blue in Green".to_string())
        )
    );
}

#[test]
fn test_parse_flat_continues_after_container() {
    let mut data = listing_item();
    let mut trailer = DmapEncoder::new();
    trailer.string(DmapTag::SongGenre, "Jazz");
    data.extend(trailer.finish());

    let flat = DmapParser::parse_flat(&data).unwrap();
    assert_eq!(flat.len(), 5);
    assert_eq!(flat[1], (DmapTag::SongArtist, "Miles Davis".to_string()));
    assert_eq!(flat[4], (DmapTag::SongGenre, "Jazz".to_string()));
}

#[test]
fn test_invalid_utf8_is_lossy() {
    let mut enc = DmapEncoder::new();
    enc.raw(DmapTag::ItemName, &[0x66, 0xFF, 0x6F]);

    let flat = DmapParser::parse_flat(&enc.finish()).unwrap();
    assert_eq!(flat[0].1, "f\u{FFFD}o");
}

#[test]
fn test_truncated_records() {
    assert_eq!(
        DmapParser::parse(b"minm\x00\x00"),
        Err(DmapDecodeError::UnexpectedEnd { needed: 8, have: 6 })
    );
    assert_eq!(
        DmapParser::parse(b"minm\x00\x00\x00\x05abc"),
        Err(DmapDecodeError::UnexpectedEnd { needed: 5, have: 3 })
    );

    // Truncation inside a container surfaces too
    let mut data = listing_item();
    let len = data.len();
    data[7] = data[7].wrapping_sub(1);
    data.truncate(len - 1);
    assert!(DmapParser::parse(&data).is_err());
}

#[test]
fn test_empty_body() {
    assert!(DmapParser::parse(&[]).unwrap().is_empty());
}

fn nested_listing_items(levels: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(levels * 8);
    for level in 0..levels {
        let inner = u32::try_from((levels - 1 - level) * 8).unwrap();
        data.extend_from_slice(b"mlit");
        data.extend_from_slice(&inner.to_be_bytes());
    }
    data
}

#[test]
fn test_deeply_nested_container_is_rejected() {
    let data = nested_listing_items(200_000);

    assert_eq!(
        DmapParser::parse_flat(&data),
        Err(DmapDecodeError::TooDeep {
            max: DmapParser::MAX_DEPTH
        })
    );
}

#[test]
fn test_nesting_at_limit_is_accepted() {
    // Outermost container sits at depth 0
    let data = nested_listing_items(DmapParser::MAX_DEPTH);
    assert!(DmapParser::parse_flat(&data).unwrap().is_empty());

    let data = nested_listing_items(DmapParser::MAX_DEPTH + 1);
    assert!(DmapParser::parse(&data).is_err());
}
