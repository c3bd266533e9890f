//! Printer protocol output checks.

use evhist_axis::{Axis, OverflowPolicy};
use evhist_registry::{JsonPrinter, Registry, TablePrinter, render};

fn demo_registry() -> Registry<f64, u32, u64> {
    let mut reg = Registry::new();
    let pt = reg
        .book_with_axis(
            "pt",
            Axis::uniform(4, 0.0, 8.0, OverflowPolicy::Drop).expect("axis"),
            1,
        )
        .expect("book pt");
    let raw = reg.book("raw", 2, 2).expect("book raw");

    let mut buf = reg.create_buffer(8).expect("buffer");
    for _ in 0..4 {
        reg.fill_coord(&mut buf, pt, 1.0, 2.0).expect("fill");
        reg.fill_value(&mut buf, raw, 0, 1, 1.0).expect("fill");
        reg.flush(&mut buf);
    }
    reg.fill_coord(&mut buf, pt, 99.0, 1.0).expect("dropped");
    reg.flush(&mut buf);
    reg
}

#[test]
fn table_output_lists_every_histogram_and_bin() {
    let reg = demo_registry();
    let mut printer = TablePrinter::new();
    let text = render(&reg, &mut printer);

    assert!(text.contains("2 histograms"));
    assert!(text.contains("5 events"));
    assert!(text.contains("1 dropped fills"));
    assert!(text.contains("-- pt (uniform"));
    assert!(text.contains("-- end pt --"));
    assert!(text.contains("-- raw (2 bins) --"));
    // 4 pt bins + 2 raw bins => six data rows with an error column.
    assert_eq!(text.matches("+-").count() - text.matches("value +- error").count(), 8);
    // Bin 0 of pt saw weight 2.0 in 4 of 5 events: mean 1.6.
    assert!(text.contains("1.600000e0"));
}

#[test]
fn render_is_repeatable() {
    let reg = demo_registry();
    let mut printer = TablePrinter::new();
    let first = render(&reg, &mut printer);
    let second = render(&reg, &mut printer);
    assert_eq!(first, second);
}

#[test]
fn json_output_follows_the_schema() {
    let reg = demo_registry();
    let mut printer = JsonPrinter::new();
    let text = render(&reg, &mut printer);
    let doc: serde_json::Value = serde_json::from_str(&text).expect("valid json");

    assert_eq!(doc["schema_version"], "evhist.report.v1");
    assert_eq!(doc["events"], 5);
    assert_eq!(doc["dropped_fills"], 1);

    let histograms = doc["histograms"].as_array().expect("histograms array");
    assert_eq!(histograms.len(), 2);
    assert_eq!(histograms[0]["name"], "pt");
    assert_eq!(histograms[1]["name"], "raw");

    let pt_bins = histograms[0]["bins"].as_array().expect("bins");
    assert_eq!(pt_bins.len(), 4);
    assert_eq!(pt_bins[0]["label"], "[0.000000, 2.000000)");
    let mean = pt_bins[0]["values"][0]["mean"].as_f64().expect("mean");
    assert!((mean - 1.6).abs() < 1e-12);

    let raw_bins = histograms[1]["bins"].as_array().expect("bins");
    assert_eq!(raw_bins.len(), 2);
    assert_eq!(raw_bins[0]["values"].as_array().expect("values").len(), 2);
}
