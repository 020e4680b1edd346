use divan::Bencher;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use validate_bag::document::ParsedDocument;
use validate_bag::validators::geo::check_geometries;
use validate_bag::{
    Check, Context, LibXml2Wrapper, RingPolygonValidator, SchemaRegistry, ValidationLevel,
    default_catalog, rules,
};

fn main() {
    divan::main();
}

const FILES_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="files">
        <xs:complexType>
            <xs:sequence>
                <xs:element name="file" minOccurs="0" maxOccurs="unbounded">
                    <xs:complexType>
                        <xs:attribute name="filepath" type="xs:string" use="required"/>
                    </xs:complexType>
                </xs:element>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"#;

/// `dataset.xml` with `count` points, envelopes and polygons
fn geometry_document(count: usize) -> String {
    let mut xml = String::from(r#"<DDM xmlns:gml="http://www.opengis.net/gml"><spatial>"#);
    for i in 0..count {
        let x = 1000 + i;
        xml.push_str(&format!(
            "<gml:Point><gml:pos>{x} 400000</gml:pos></gml:Point>\
             <gml:Envelope><gml:lowerCorner>{x} 300000</gml:lowerCorner>\
             <gml:upperCorner>{x} 600000</gml:upperCorner></gml:Envelope>\
             <gml:Polygon><gml:exterior><gml:LinearRing>\
             <gml:posList>0 0 0 10 10 10 10 0 0 0</gml:posList>\
             </gml:LinearRing></gml:exterior></gml:Polygon>"
        ));
    }
    xml.push_str("</spatial></DDM>");
    xml
}

fn files_document(count: usize) -> String {
    let mut xml = String::from("<files>");
    for i in 0..count {
        xml.push_str(&format!("<file filepath=\"data/file-{i}.txt\"/>"));
    }
    xml.push_str("</files>");
    xml
}

#[divan::bench(args = [10, 100, 1000])]
fn geometry_checks(bencher: Bencher, count: usize) {
    let document = ParsedDocument::parse("dataset.xml", geometry_document(count).as_bytes());
    let root = document.root().expect("benchmark document parses");

    bencher.bench_local(move || check_geometries(root, &RingPolygonValidator));
}

#[divan::bench(args = [10, 1000])]
fn parse_document(bencher: Bencher, count: usize) {
    let xml = geometry_document(count);
    bencher.bench_local(move || ParsedDocument::parse("dataset.xml", xml.as_bytes()));
}

fn files_bag(count: usize) -> (TempDir, Arc<SchemaRegistry>) {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("metadata")).unwrap();
    fs::write(dir.path().join("metadata/files.xml"), files_document(count)).unwrap();

    let schema = LibXml2Wrapper::new()
        .parse_schema_from_memory(FILES_XSD.as_bytes())
        .unwrap();
    let mut registry = SchemaRegistry::new();
    registry.insert("files.xml", schema);
    (dir, Arc::new(registry))
}

#[divan::bench(args = [10, 1000])]
fn schema_conformance(bencher: Bencher, count: usize) {
    let (dir, registry) = files_bag(count);
    let check = Check::ConformsToSchema {
        path: PathBuf::from("metadata/files.xml"),
        schema_key: "files.xml".to_string(),
    };

    // Fresh context per iteration so the document cache does not hide the parse
    bencher.bench_local(move || {
        let ctx = Context::new(dir.path(), Arc::clone(&registry));
        tokio_test::block_on(check.evaluate(&ctx))
    });
}

#[divan::bench]
fn stand_alone_run(bencher: Bencher) {
    let (dir, registry) = files_bag(100);
    let catalog = default_catalog(ValidationLevel::StandAlone).unwrap();

    bencher.bench_local(move || {
        let ctx = Context::new(dir.path(), Arc::clone(&registry));
        tokio_test::block_on(rules::run(&catalog, &ctx))
    });
}
