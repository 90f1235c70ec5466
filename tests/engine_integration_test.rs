mod common;

use std::thread;

use common::test_helpers::{INVALID_ID_XML, VALID_ID_XML, Workspace};
use xsd_batch_validator::{
    DocumentErrors, ErrorAggregator, SchemaSource, SchemaValidatorEngine, Severity,
};

const RECORD_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="record">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="id" type="xs:integer"/>
                <xs:element name="count" type="xs:positiveInteger"/>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;

#[test]
fn test_errors_carry_line_numbers() {
    let ws = Workspace::new();
    let schema = ws.dir.path().join("schema").join("record.xsd");
    std::fs::write(&schema, RECORD_XSD).unwrap();
    let doc = ws.add("r.xml", "<record>\n<id>x</id>\n<count>y</count>\n</record>");

    let validator = SchemaValidatorEngine::new()
        .compile(&SchemaSource::Path(schema))
        .unwrap();
    let mut errors = DocumentErrors::new();
    validator.validate(&doc, &mut errors).unwrap();

    let lines: Vec<Option<u32>> = errors.errors().iter().map(|e| e.line).collect();
    assert!(lines.contains(&Some(2)));
    assert!(lines.contains(&Some(3)));
    assert!(errors.errors().iter().all(|e| e.severity == Severity::Error));
    assert!(errors.errors().iter().all(|e| !e.message.ends_with('\n')));
}

#[test]
fn test_validator_clones_share_one_schema_across_threads() {
    let ws = Workspace::new();
    let mut docs = Vec::new();
    for i in 0..16 {
        let content = if i % 2 == 0 { VALID_ID_XML } else { INVALID_ID_XML };
        docs.push(ws.add(&format!("doc{:02}.xml", i), content));
    }

    let validator = SchemaValidatorEngine::new()
        .compile(&SchemaSource::Path(ws.schema()))
        .unwrap();

    let handles: Vec<_> = docs
        .chunks(4)
        .map(|chunk| {
            let validator = validator.clone();
            let chunk = chunk.to_vec();
            thread::spawn(move || {
                let mut partial = ErrorAggregator::new();
                for doc in chunk {
                    let mut errors = DocumentErrors::new();
                    validator.validate(&doc, &mut errors).unwrap();
                    errors.commit(&mut partial);
                }
                partial
            })
        })
        .collect();

    let mut total = ErrorAggregator::new();
    for handle in handles {
        total.merge(handle.join().unwrap());
    }

    let snapshot = total.into_snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.total(), 8);
}
