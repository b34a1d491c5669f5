use indoc::indoc;
use skelkit::formats::{SegType, TmxFilter, TmxParameters};
use skelkit::{
    AlignmentStatus, Error, Event, Filter, FilterState, LineBreak, LocaleId, RawDocument,
    SkeletonWriter, TextFragment, TextUnit, WriterOptions, extract, rewrite, roundtrip,
};

const MEMORY: &str = indoc! {r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <!DOCTYPE tmx SYSTEM "tmx14.dtd">
    <tmx version="1.4">
      <header creationtool="skel" segtype="sentence" o-tmf="x" adminlang="en" srclang="en" datatype="plaintext">
        <prop type="client">ACME</prop>
        <note>Sample memory</note>
      </header>
      <body>
        <!-- first unit -->
        <tu tuid="greeting" segtype="paragraph">
          <prop type="domain">ui</prop>
          <tuv xml:lang="en"><seg>Click <bpt i="1">&lt;b></bpt>here<ept i="1">&lt;/b></ept> &amp; go</seg></tuv>
          <tuv xml:lang="fr" creationid="bob"><seg>Cliquez <bpt i="1">&lt;b></bpt>ici<ept i="1">&lt;/b></ept></seg></tuv>
          <tuv xml:lang="fr"><seg>Appuyez</seg></tuv>
          <tuv xml:lang="de"><seg>Klicken</seg></tuv>
        </tu>
        <tu><tuv xml:lang="en"><seg>Line<ph x="2">{0}</ph> <hi x="3">end</hi></seg></tuv></tu>
      </body>
    </tmx>
"#};

fn document(input: &str) -> RawDocument {
    RawDocument::from_text(input)
        .with_source_locale("en")
        .with_target_locale("fr")
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn events_with(params: TmxParameters, input: &str) -> Vec<Event> {
    init_logging();
    let mut filter = TmxFilter::with_parameters(params);
    extract(&mut filter, document(input)).unwrap()
}

fn units(events: &[Event]) -> Vec<&TextUnit> {
    events.iter().filter_map(Event::as_text_unit).collect()
}

fn render(events: &[Event], options: WriterOptions) -> String {
    let mut writer = SkeletonWriter::new(options);
    let mut out = Vec::new();
    for event in events {
        writer.write_event(event, &mut out).unwrap();
    }
    writer.flush(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn pull_until_error(filter: &mut TmxFilter) -> Error {
    while filter.has_next() {
        if let Err(err) = filter.next() {
            return err;
        }
    }
    panic!("expected the filter to fail");
}

#[test]
fn test_end_to_end_target_replacement() {
    let input = r#"<tu><tuv lang="en"><seg>Hi</seg></tuv><tuv lang="fr"><seg>Salut</seg></tuv></tu>"#;
    let events = events_with(TmxParameters::default(), input);
    let units = units(&events);
    assert_eq!(units.len(), 1);

    let fr = LocaleId::new("fr");
    assert_eq!(units[0].source.first_content().unwrap().coded_text(), "Hi");
    assert_eq!(
        units[0].target(&fr).unwrap().first_content().unwrap().coded_text(),
        "Salut"
    );

    let mut out = Vec::new();
    rewrite(
        &mut TmxFilter::new(),
        document(input),
        WriterOptions::new(),
        &mut out,
        |unit| unit.set_target_content(&fr, TextFragment::from_text("Bonjour")),
    )
    .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), input.replace("Salut", "Bonjour"));
}

#[test]
fn test_event_order_and_kinds() {
    let events = events_with(TmxParameters::default(), MEMORY);
    let kinds: Vec<&str> = events.iter().map(Event::kind).collect();
    assert_eq!(
        kinds,
        vec![
            "StartDocument",
            "DocumentPart",
            "DocumentPart",
            "TextUnit",
            "TextUnit",
            "DocumentPart",
            "TextUnit",
            "Ending",
        ]
    );
    let Event::StartDocument(start) = &events[0] else {
        panic!("expected a start document");
    };
    assert_eq!(start.id, "sd1");
    assert_eq!(start.encoding, "UTF-8");
    assert!(start.multilingual);
    assert!(!start.has_bom);
    assert_eq!(start.line_break, LineBreak::Lf);
}

#[test]
fn test_unmodified_memory_round_trips() {
    let output = roundtrip(&mut TmxFilter::new(), document(MEMORY), WriterOptions::new()).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), MEMORY);
}

#[test]
fn test_units_codes_and_properties() {
    let events = events_with(TmxParameters::default(), MEMORY);
    let units = units(&events);
    let ids: Vec<&str> = units.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);

    let primary = units[0];
    assert_eq!(primary.name.as_deref(), Some("greeting"));
    assert_eq!(primary.properties["domain"], "ui");
    assert_eq!(primary.properties["tuid"], "greeting");
    assert_eq!(
        primary.source.first_content().unwrap().to_generic(),
        "Click <1>here</1> & go"
    );

    let fr = LocaleId::new("fr");
    let target = primary.target(&fr).unwrap();
    assert_eq!(target.text(), "Cliquez ici");
    assert_eq!(target.properties["creationid"], "bob");
    assert_eq!(primary.target(&LocaleId::new("de")).unwrap().text(), "Klicken");

    let code = &primary.source.first_content().unwrap().codes()[0];
    assert_eq!(code.data, "<b>");
    assert_eq!(code.outer_data, "<bpt i=\"1\">&lt;b></bpt>");

    let last = units[2];
    assert_eq!(
        last.source.first_content().unwrap().to_generic(),
        "Line<2/> <3>end</3>"
    );
}

#[test]
fn test_duplicate_targets_become_secondary_units() {
    let events = events_with(TmxParameters::default(), MEMORY);
    let units = units(&events);
    let fr = LocaleId::new("fr");

    let secondary = units[1];
    assert_eq!(secondary.name.as_deref(), Some("greeting"));
    assert_eq!(secondary.source.text(), units[0].source.text());
    assert_eq!(secondary.target(&fr).unwrap().text(), "Appuyez");
    assert_eq!(secondary.written_by.as_deref(), Some(units[0].id.as_str()));

    // rendered alone, a secondary unit shows just its own variant
    let writer = SkeletonWriter::new(WriterOptions::new());
    let alone = writer.render_event(&Event::TextUnit(secondary.clone()));
    assert_eq!(alone, "<tuv xml:lang=\"fr\"><seg>Appuyez</seg></tuv>\n    ");
}

#[test]
fn test_duplicate_count_matches_target_variants() {
    let input = indoc! {r#"
        <tu>
          <tuv xml:lang="en"><seg>Yes</seg></tuv>
          <tuv xml:lang="fr"><seg>Oui</seg></tuv>
          <tuv xml:lang="fr"><seg>Ouais</seg></tuv>
          <tuv xml:lang="fr"><seg>Bien sûr</seg></tuv>
        </tu>
    "#};
    let events = events_with(TmxParameters::default(), input);
    let units = units(&events);
    let fr = LocaleId::new("fr");
    let targets: Vec<String> = units.iter().map(|u| u.target(&fr).unwrap().text()).collect();
    assert_eq!(targets, vec!["Oui", "Ouais", "Bien sûr"]);
    assert!(units.iter().all(|u| u.source.text() == "Yes"));

    // editing a secondary unit changes the matching variant in place
    let mut events = events;
    if let Some(unit) = events.iter_mut().filter_map(Event::as_text_unit_mut).nth(1) {
        unit.set_target_content(&fr, TextFragment::from_text("Carrément"));
    }
    assert_eq!(render(&events, WriterOptions::new()), input.replace("Ouais", "Carrément"));
}

#[test]
fn test_empty_segment_round_trips() {
    let input = indoc! {r#"
        <tmx version="1.4"><body>
        <tu tuid="t1">
          <tuv xml:lang="en"><seg>Cancel</seg></tuv>
          <tuv xml:lang="fr"><seg/></tuv>
          <tuv xml:lang="de"><seg /></tuv>
        </tu>
        </body></tmx>
    "#};
    let output = roundtrip(&mut TmxFilter::new(), document(input), WriterOptions::new()).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), input);

    let strict_others = TmxParameters::new().with_process_all_targets(false);
    let output = roundtrip(
        &mut TmxFilter::with_parameters(strict_others),
        document(input),
        WriterOptions::new(),
    )
    .unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), input);
}

#[test]
fn test_empty_segment_takes_a_translation() {
    let input = r#"<tu><tuv xml:lang="en"><seg>Cancel</seg></tuv><tuv xml:lang="fr"><seg/></tuv></tu>"#;
    let fr = LocaleId::new("fr");
    let events = events_with(TmxParameters::default(), input);
    assert_eq!(units(&events)[0].target(&fr).unwrap().text(), "");

    let mut out = Vec::new();
    rewrite(
        &mut TmxFilter::new(),
        document(input),
        WriterOptions::new(),
        &mut out,
        |unit| unit.set_target_content(&fr, TextFragment::from_text("Annuler")),
    )
    .unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        input.replace("<seg/>", "<seg>Annuler</seg>")
    );
}

#[test]
fn test_malformed_bytes_are_fatal() {
    let mut bytes = br#"<tmx><body><tu><tuv xml:lang="en"><seg>caf"#.to_vec();
    bytes.push(0xFF);
    bytes.extend_from_slice(b"</seg></tuv></tu></body></tmx>");

    let mut filter = TmxFilter::new();
    let doc = RawDocument::from_bytes(bytes)
        .with_source_locale("en")
        .with_target_locale("fr");
    let result = filter.open(doc).and_then(|()| {
        while filter.has_next() {
            filter.next()?;
        }
        Ok(())
    });
    match result {
        Err(Error::MalformedInput(input)) => {
            assert_eq!(input.encoding, "UTF-8");
            assert_eq!(input.offset, 42);
        }
        other => panic!("expected malformed input, got {:?}", other),
    }
}

#[test]
fn test_segmentation_policy() {
    let events = events_with(TmxParameters::default(), MEMORY);
    let found = units(&events);
    // unit segtype wins over the header
    assert!(!found[0].source.is_segmented());
    assert_eq!(found[0].source.alignment(), AlignmentStatus::NotAligned);
    // header segtype applies when the unit has none
    assert!(found[2].source.is_segmented());
    assert_eq!(found[2].source.alignment(), AlignmentStatus::Aligned);

    let forced = events_with(TmxParameters::new().with_seg_type(SegType::Paragraph), MEMORY);
    assert!(units(&forced).iter().all(|u| !u.source.is_segmented()));
}

#[test]
fn test_header_properties() {
    let events = events_with(TmxParameters::default(), MEMORY);
    let Event::DocumentPart(header) = &events[1] else {
        panic!("expected the header part");
    };
    assert_eq!(header.properties["creationtool"], "skel");
    assert_eq!(header.properties["client"], "ACME");
    assert_eq!(header.properties["note"], "Sample memory");
}

#[test]
fn test_missing_target_slot_is_filled_on_output() {
    let input = indoc! {r#"
        <tmx><body>
        <tu><tuv xml:lang="en"><seg>Save</seg></tuv></tu>
        </body></tmx>
    "#};
    let fr = LocaleId::new("fr");
    let mut out = Vec::new();
    rewrite(
        &mut TmxFilter::new(),
        document(input),
        WriterOptions::new(),
        &mut out,
        |unit| unit.set_target_content(&fr, TextFragment::from_text("Enregistrer")),
    )
    .unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        input.replace(
            "</tuv></tu>",
            "</tuv><tuv xml:lang=\"fr\"><seg>Enregistrer</seg></tuv>\n</tu>"
        )
    );
}

#[test]
fn test_placeholder_deferral() {
    let input = r#"<tu><tuv xml:lang="en"><seg>Hi</seg></tuv><tuv xml:lang="fr"><seg>Salut</seg></tuv></tu>"#;
    let mut events = events_with(TmxParameters::default(), input);
    let fr = LocaleId::new("fr");

    let first = render(&events, WriterOptions::new());
    for event in &mut events {
        if let Some(unit) = event.as_text_unit_mut() {
            unit.set_target_content(&fr, TextFragment::from_text("Coucou & bises"));
        }
    }
    let second = render(&events, WriterOptions::new());
    assert_eq!(first, input);
    assert_ne!(first, second);
    assert!(second.contains("<seg>Coucou &amp; bises</seg>"));
}

#[test]
fn test_missing_source_variant_is_fatal() {
    let input = r#"<tu><tuv xml:lang="fr"><seg>Salut</seg></tuv></tu>"#;
    let mut filter = TmxFilter::new();
    filter.open(document(input)).unwrap();
    let err = pull_until_error(&mut filter);
    assert!(matches!(err, Error::MissingSourceVariant { .. }));
    assert_eq!(filter.state(), FilterState::Finished);
    assert!(!filter.has_next());
}

#[test]
fn test_duplicate_source_variant_is_fatal() {
    let input = r#"<tu><tuv xml:lang="en"><seg>A</seg></tuv><tuv xml:lang="EN"><seg>B</seg></tuv></tu>"#;
    let mut filter = TmxFilter::new();
    filter.open(document(input)).unwrap();
    assert!(matches!(
        pull_until_error(&mut filter),
        Error::DuplicateSourceVariant { .. }
    ));
}

#[test]
fn test_variant_without_locale_is_fatal() {
    let input = r#"<tu tuid="t9"><tuv><seg>A</seg></tuv></tu>"#;
    let mut filter = TmxFilter::new();
    filter.open(document(input)).unwrap();
    match pull_until_error(&mut filter) {
        Error::MissingVariantLocale(unit) => assert_eq!(unit, "t9"),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_truncated_unit_is_fatal() {
    let input = r#"<tmx><body><tu><tuv xml:lang="en"><seg>Hi"#;
    let mut filter = TmxFilter::new();
    filter.open(document(input)).unwrap();
    pull_until_error(&mut filter);
    assert_eq!(filter.state(), FilterState::Finished);
}

#[test]
fn test_locales_are_required() {
    let mut filter = TmxFilter::new();
    let err = filter
        .open(RawDocument::from_text("<tmx/>").with_target_locale("fr"))
        .unwrap_err();
    assert!(matches!(err, Error::MissingLocale("source")));

    let err = filter
        .open(RawDocument::from_text("<tmx/>").with_source_locale("en"))
        .unwrap_err();
    assert!(matches!(err, Error::MissingLocale("target")));
}

#[test]
fn test_invalid_unit_is_skipped_verbatim() {
    let input = indoc! {r#"
        <body>
        <tu><tuv xml:lang="en"><seg>A <b>bold</b></seg></tuv></tu>
        <tu><tuv xml:lang="en"><seg>B</seg></tuv></tu>
        </body>
    "#};
    let events = events_with(TmxParameters::default(), input);
    let units = units(&events);
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].id, "1");
    assert_eq!(units[0].source.text(), "B");

    let skipped = events
        .iter()
        .filter_map(|e| match e {
            Event::DocumentPart(part) => Some(render(&[Event::DocumentPart(part.clone())], WriterOptions::new())),
            _ => None,
        })
        .any(|text| text == r#"<tu><tuv xml:lang="en"><seg>A <b>bold</b></seg></tuv></tu>"#);
    assert!(skipped);

    let output = roundtrip(&mut TmxFilter::new(), document(input), WriterOptions::new()).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), input);
}

#[test]
fn test_invalid_unit_aborts_when_strict() {
    let input = r#"<tu><note>n</note><foo/><tuv xml:lang="en"><seg>A</seg></tuv></tu>"#;
    let mut filter = TmxFilter::with_parameters(TmxParameters::new().with_exit_on_invalid(true));
    filter.open(document(input)).unwrap();
    match pull_until_error(&mut filter) {
        Error::InvalidUnit(message) => assert!(message.contains("<foo> not allowed in <tu>")),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_isolated_and_degraded_codes() {
    let input = r#"<tu><tuv xml:lang="en"><seg><it pos="end" x="2">&lt;/u></it>a<it pos="begin" x="1">&lt;i></it>b<it x="3">?</it></seg></tuv></tu>"#;
    let events = events_with(TmxParameters::default(), input);
    let content = units(&events)[0].source.first_content().unwrap().clone();
    assert_eq!(content.to_generic(), "<e2/>a<b1/>b<3/>");
    assert!(content.codes().iter().all(|c| c.isolated));
}

#[test]
fn test_codes_without_ids_still_balance() {
    let input = r#"<tu><tuv xml:lang="en"><seg><hi>a</hi> <ph/> <hi>b</hi></seg></tuv></tu>"#;
    let events = events_with(TmxParameters::default(), input);
    let content = units(&events)[0].source.first_content().unwrap().clone();
    assert_eq!(content.to_generic(), "<1>a</1> <2/> <3>b</3>");
}

#[test]
fn test_other_locales_respect_process_all_targets() {
    let de = LocaleId::new("de");
    let all = events_with(TmxParameters::default(), MEMORY);
    assert!(units(&all)[0].has_target(&de));

    let params = TmxParameters::new().with_process_all_targets(false);
    let only_target = events_with(params.clone(), MEMORY);
    assert!(!units(&only_target)[0].has_target(&de));

    let output = roundtrip(
        &mut TmxFilter::with_parameters(params),
        document(MEMORY),
        WriterOptions::new(),
    )
    .unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), MEMORY);
}

#[test]
fn test_per_element_document_parts() {
    let input = "<tmx>\n<body>\n<tu><tuv xml:lang=\"en\"><seg>A</seg></tuv></tu>\n</body>\n</tmx>";
    let params = TmxParameters::new().with_consolidate_skeleton(false);
    let events = events_with(params.clone(), input);
    let parts = events
        .iter()
        .filter(|e| matches!(e, Event::DocumentPart(_)))
        .count();
    assert_eq!(parts, 5);

    let consolidated = events_with(TmxParameters::default(), input);
    let consolidated_parts = consolidated
        .iter()
        .filter(|e| matches!(e, Event::DocumentPart(_)))
        .count();
    assert_eq!(consolidated_parts, 1);

    assert_eq!(render(&events, WriterOptions::new()), input);
}

#[test]
fn test_utf16_with_bom_round_trips() {
    let text = "<?xml version=\"1.0\" encoding=\"UTF-16\"?>\r\n<tmx><body><tu><tuv xml:lang=\"en\"><seg>Caf\u{e9}</seg></tuv></tu></body></tmx>\r\n";
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));

    let raw = || {
        RawDocument::from_bytes(bytes.clone())
            .with_source_locale("en")
            .with_target_locale("fr")
    };
    let events = extract(&mut TmxFilter::new(), raw()).unwrap();
    let Event::StartDocument(start) = &events[0] else {
        panic!("expected a start document");
    };
    assert!(start.has_bom);
    assert_eq!(start.detected_encoding, "UTF-16LE");
    assert_eq!(start.line_break, LineBreak::CrLf);
    assert_eq!(units(&events)[0].source.text(), "Caf\u{e9}");

    let output = roundtrip(&mut TmxFilter::new(), raw(), WriterOptions::new()).unwrap();
    assert_eq!(output, bytes);
}

#[test]
fn test_bom_wins_over_declared_encoding() {
    let text = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><tu><tuv xml:lang=\"en\"><seg>x</seg></tuv></tu>";
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
    let events = extract(
        &mut TmxFilter::new(),
        RawDocument::from_bytes(bytes)
            .with_source_locale("en")
            .with_target_locale("fr"),
    )
    .unwrap();
    let Event::StartDocument(start) = &events[0] else {
        panic!("expected a start document");
    };
    assert_eq!(start.detected_encoding, "UTF-16LE");
    // the declaration is corrected on output
    assert_eq!(start.encoding, "UTF-16LE");
}

#[test]
fn test_output_encoding_override() {
    let input = "<?xml version=\"1.0\" encoding=\"utf-8\"?><tu><tuv xml:lang=\"en\"><seg>\u{e9}t\u{e9}</seg></tuv></tu>";
    let output = roundtrip(
        &mut TmxFilter::new(),
        document(input),
        WriterOptions::new().with_output_encoding("iso-8859-1"),
    )
    .unwrap();
    let expected: &[u8] =
        b"<?xml version=\"1.0\" encoding=\"iso-8859-1\"?><tu><tuv xml:lang=\"en\"><seg>\xe9t\xe9</seg></tuv></tu>";
    assert_eq!(output, expected);
}

#[test]
fn test_cancellation_between_units() {
    let mut filter = TmxFilter::new();
    filter.open(document(MEMORY)).unwrap();
    let handle = filter.cancel_handle();

    assert!(matches!(filter.next().unwrap(), Event::StartDocument(_)));
    std::thread::spawn(move || handle.cancel()).join().unwrap();
    assert!(matches!(filter.next().unwrap(), Event::Cancelled));
    assert!(!filter.has_next());
    assert!(filter.next().is_err());

    // reopening clears the flag
    filter.open(document(MEMORY)).unwrap();
    let count = filter.events().filter(|e| e.is_ok()).count();
    assert_eq!(count, 8);
}

#[test]
fn test_close_is_idempotent() {
    let mut filter = TmxFilter::new();
    filter.open(document(MEMORY)).unwrap();
    filter.close();
    filter.close();
    assert_eq!(filter.state(), FilterState::Finished);
    assert!(!filter.has_next());
}
