use super::*;

fn flat(pairs: &[(&str, &str)]) -> RenditionOptions {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[test]
fn image_options_survive_a_round_trip() {
    let original = flat(&[
        ("resizeWidth", "100"),
        ("resizeHeight", "80"),
        ("allowEnlargement", "false"),
        ("thumbnail", "true"),
        ("autoOrient", "false"),
        ("startPage", "0"),
        ("endPage", "3"),
        ("cropGravity", "North"),
        ("cropWidth", "10"),
        ("timeout", "5000"),
        ("vendorHint", "fast"),
    ]);

    let structured = to_structured(&original, "image/png").expect("structured");
    assert_eq!(to_flat(&structured).expect("flat"), original);
}

#[test]
fn pages_are_one_based_when_structured() {
    let structured = to_structured(&flat(&[("startPage", "0"), ("endPage", "4")]), "text/plain")
        .expect("structured");

    assert_eq!(
        structured.source_options,
        vec![SourceOptions::Paged(PagedSourceOptions {
            start_page_number: Some(1),
            end_page_number: Some(5),
        })]
    );
    assert_eq!(structured.kind, OptionsKind::Generic);
}

#[test]
fn a_single_page_flattens_to_page() {
    let structured = to_structured(&flat(&[("startPage", "2"), ("endPage", "2")]), "image/png")
        .expect("structured");

    assert_eq!(to_flat(&structured).expect("flat"), flat(&[("page", "2")]));
}

#[test]
fn default_flags_are_not_written() {
    let structured = to_structured(
        &flat(&[
            ("maintainAspectRatio", "true"),
            ("allowEnlargement", "true"),
            ("alphaRemove", "false"),
        ]),
        "image/jpeg",
    )
    .expect("structured");

    assert_eq!(to_flat(&structured).expect("flat"), RenditionOptions::new());
}

#[test]
fn image_keys_select_image_options_for_any_target() {
    let structured =
        to_structured(&flat(&[("resizeWidth", "64")]), "application/pdf").expect("structured");

    match structured.kind {
        OptionsKind::Image(image) => {
            let resize = image.resize.expect("resize options");
            assert_eq!(resize.width, Some(64));
            assert!(resize.maintain_aspect_ratio);
        }
        other => panic!("expected image options, got {other:?}"),
    }
}

#[test]
fn flash_target_carries_version() {
    let structured = to_structured(
        &flat(&[("flashVersion", "9")]),
        "application/x-shockwave-flash",
    )
    .expect("structured");

    assert_eq!(
        structured.kind,
        OptionsKind::Flash {
            version: Some("9".to_string())
        }
    );
}

#[test]
fn unusable_values_are_rejected() {
    let err = to_structured(&flat(&[("resizeWidth", "wide")]), "image/png").expect_err("bad int");
    assert_eq!(
        err,
        UnsupportedOptionsError::InvalidValue {
            key: "resizeWidth".to_string(),
            value: "wide".to_string(),
        }
    );

    let err = to_structured(&flat(&[("page", "-1")]), "image/png").expect_err("negative page");
    assert!(matches!(err, UnsupportedOptionsError::InvalidValue { .. }));

    let err = to_structured(&flat(&[("thumbnail", "yes")]), "image/png").expect_err("bad flag");
    assert!(err.to_string().contains("thumbnail"));
}

#[test]
fn unrecognized_source_options_cannot_be_flattened() {
    let options = TransformationOptions {
        source_options: vec![SourceOptions::Unrecognized {
            kind: "vendor.stereo".to_string(),
        }],
        ..TransformationOptions::default()
    };

    assert_eq!(
        to_flat(&options),
        Err(UnsupportedOptionsError::UnrecognizedSourceOptions {
            kind: "vendor.stereo".to_string()
        })
    );
}

#[test]
fn page_zero_has_no_flat_form() {
    let options = TransformationOptions {
        source_options: vec![SourceOptions::Paged(PagedSourceOptions {
            start_page_number: Some(0),
            end_page_number: None,
        })],
        ..TransformationOptions::default()
    };

    assert!(to_flat(&options).is_err());
}

#[test]
fn temporal_and_crop_options_are_grouped() {
    let structured = to_structured(
        &flat(&[
            ("offset", "00:00:05"),
            ("duration", "00:00:10"),
            ("cropPercentage", "true"),
            ("cropXOffset", "3"),
        ]),
        "video/mp4",
    )
    .expect("structured");

    assert_eq!(structured.source_options.len(), 2);
    assert!(structured.source_options.contains(&SourceOptions::Temporal(
        TemporalSourceOptions {
            offset: Some("00:00:05".to_string()),
            duration: Some("00:00:10".to_string()),
        }
    )));
    assert!(structured.extra.is_empty());
}

#[test]
fn image_keys_cannot_ride_along_with_flash() {
    let err = to_structured(
        &flat(&[("flashVersion", "9"), ("resizeWidth", "100")]),
        "image/png",
    )
    .expect_err("flash drops image options");
    assert_eq!(
        err,
        UnsupportedOptionsError::Conflict {
            key: "resizeWidth".to_string(),
            other: "flashVersion".to_string(),
        }
    );

    let err = to_structured(
        &flat(&[("autoOrient", "false")]),
        "application/x-shockwave-flash",
    )
    .expect_err("flash target drops image options");
    assert!(matches!(err, UnsupportedOptionsError::Conflict { .. }));
}

#[test]
fn page_cannot_be_mixed_with_a_page_range() {
    let err = to_structured(&flat(&[("page", "1"), ("endPage", "4")]), "image/png")
        .expect_err("page hides endPage");
    assert_eq!(
        err,
        UnsupportedOptionsError::Conflict {
            key: "page".to_string(),
            other: "endPage".to_string(),
        }
    );

    let err = to_structured(&flat(&[("page", "1"), ("startPage", "1")]), "image/png")
        .expect_err("page hides startPage");
    assert!(err.to_string().contains("startPage"));
}
