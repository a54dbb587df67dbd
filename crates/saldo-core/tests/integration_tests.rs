//! End-to-end tests over the public API

use std::collections::HashMap;

use saldo_core::{
    parse_document, CategorySource, DocumentKind, Error, IngestPipeline, MerchantNormalizer,
    OtherTransaction, ReclassifyConfig, Reclassifier, SkipReason, TrainingExample, VecBucket,
};

#[test]
fn test_csv_document_end_to_end() {
    let csv = "Kontoutskrift for 1234.56.78901\n\
               \n\
               Dato;Beskrivelse;Beløp;Valuta\n\
               02.01.2026;REMA 1000;-123,45;NOK\n\
               05.01.2026;VIPPS OLA NORDMANN;-200,00;NOK\n\
               Saldo;;12 345,67;NOK\n\
               \n\
               Dato;Beskrivelse;Beløp;Valuta\n\
               01.02.2026;Lønn februar;30 000,00;NOK";
    let outcome = parse_document(csv.as_bytes(), DocumentKind::Csv).unwrap();

    assert_eq!(outcome.transactions.len(), 3);
    assert_eq!(outcome.transactions[0].tx_date.to_string(), "2026-01-02");
    assert_eq!(outcome.transactions[0].amount, -123.45);
    assert_eq!(outcome.transactions[2].amount, 30000.0);
    assert_eq!(outcome.detected_format.as_deref(), Some("semicolon_headered"));

    // both blank-row-separated sections were recovered
    assert_eq!(outcome.skipped.count(SkipReason::Header), 2);
    // every source line either became a transaction or was counted
    let total_lines = csv.lines().count() as u64;
    assert_eq!(
        outcome.transactions.len() as u64 + outcome.skipped.total(),
        total_lines
    );
    // the balance row never became a zero-amount transaction
    assert!(outcome.transactions.iter().all(|t| t.amount != 0.0));
}

#[test]
fn test_oversize_payload_is_rejected_with_zero_transactions() {
    let bytes = vec![b'a'; 13 * 1024 * 1024];
    match parse_document(&bytes, DocumentKind::Spreadsheet) {
        Err(Error::PayloadTooLarge { .. }) => {}
        other => panic!("expected PayloadTooLarge, got {:?}", other),
    }
}

#[test]
fn test_statement_text_end_to_end() {
    let text = "Kontoutskrift januar 2026\n\
                01.01.2026 - 31.01.2026\n\
                Dato Beskrivelse Beløp\n\
                02.02.2026 KIWI -123,45 2026\n\
                03.02.2026 VISA VAREKJØP MENY OSLO 1 234,56-\n\
                Side 1 av 1";
    let outcome = parse_document(text.as_bytes(), DocumentKind::PdfText).unwrap();

    assert_eq!(outcome.transactions.len(), 2);
    // the trailing year token was never chosen as the amount
    assert_eq!(outcome.transactions[0].amount, -123.45);
    assert!(outcome.transactions[0]
        .merchant_raw
        .as_deref()
        .unwrap()
        .contains("KIWI"));
    assert_eq!(outcome.skipped.count(SkipReason::PageNumber), 1);
    assert_eq!(outcome.skipped.count(SkipReason::Header), 1);
    assert_eq!(outcome.skipped.count(SkipReason::SectionMarker), 2);
}

#[test]
fn test_pipeline_categorizes_at_ingest() {
    let csv = "Dato;Beskrivelse;Beløp\n\
               02.01.2026;KIWI 334 OSLO;-123,45\n\
               03.01.2026;NETFLIX.COM;-149,00\n\
               04.01.2026;HELT UKJENT AS;-10,00";
    let pipeline = IngestPipeline::new();
    let outcome = pipeline.ingest(csv.as_bytes(), DocumentKind::Csv, &[]).unwrap();

    assert_eq!(outcome.transactions.len(), 3);
    assert_eq!(outcome.transactions[0].category_id.as_deref(), Some("groceries"));
    assert_eq!(outcome.transactions[0].category_source, CategorySource::Hint);
    assert_eq!(
        outcome.transactions[1].category_id.as_deref(),
        Some("subscriptions.streaming")
    );
    assert_eq!(outcome.transactions[2].category_id, None);
    assert_eq!(
        outcome.transactions[2].category_source,
        CategorySource::Uncategorized
    );
}

#[test]
fn test_merchant_grouping_is_stable_across_documents() {
    let normalizer = MerchantNormalizer::new();
    let csv = "Dato;Beskrivelse;Beløp;Butikk\n\
               02.01.2026;Varekjøp;-50,00;KIWI 334 Grünerløkka\n\
               03.01.2026;Varekjøp;-75,00;kiwi 518 Majorstuen";
    let outcome = parse_document(csv.as_bytes(), DocumentKind::Csv).unwrap();
    let keys: Vec<String> = outcome
        .transactions
        .iter()
        .map(|t| normalizer.chain_key(t.merchant_raw.as_deref().unwrap()))
        .collect();
    assert_eq!(keys[0], keys[1]);
}

#[test]
fn test_reclassify_other_bucket_end_to_end() {
    let mut corpus = Vec::new();
    for i in 0..12 {
        corpus.push(TrainingExample {
            category_id: "groceries".to_string(),
            text: format!("kiwi dagligvarer uke {}", i),
        });
        corpus.push(TrainingExample {
            category_id: "subscriptions.streaming".to_string(),
            text: format!("netflix månedsabonnement {}", i),
        });
    }
    let parents = HashMap::new();
    let reclassifier = Reclassifier::new(&corpus, ReclassifyConfig::default(), &parents);

    let bucket = VecBucket::new(vec![
        OtherTransaction {
            id: 1,
            text: "KIWI 334 dagligvarer".to_string(),
            amount: -312.50,
        },
        OtherTransaction {
            id: 2,
            // predicted grocery but carries no grocery brand token
            text: "dagligvarer diverse".to_string(),
            amount: -100.0,
        },
    ]);
    let report = reclassifier.run(&bucket, None, false).unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.proposed, 1);
    assert_eq!(report.candidates[0].transaction_id, 1);
    assert_eq!(report.candidates[0].predicted_category, "groceries");
    assert!(report.candidates[0].probability >= 0.75);
    assert!(report.candidates[0].margin >= 1.2);
}
