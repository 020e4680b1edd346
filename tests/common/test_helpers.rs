use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use validate_bag::{Context, LibXml2Wrapper, SchemaRegistry};

use super::mocks::{ACCOUNT, ORGANIZATIONAL_ID, SWORD_TOKEN};

pub const GML_NS: &str = "http://www.opengis.net/gml";

/// Accepts a `DDM` root with any content
pub const DATASET_XSD: &str = r###"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="DDM">
        <xs:complexType>
            <xs:sequence>
                <xs:any namespace="##any" processContents="skip" minOccurs="0" maxOccurs="unbounded"/>
            </xs:sequence>
        </xs:complexType>
    </xs:element>
</xs:schema>"###;

pub const FILES_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
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

pub const FILES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<files>
    <file filepath="data/a.txt"/>
</files>
"#;

/// `dataset.xml` wrapping `geometry` in a GML-aware `DDM` root
pub fn dataset_xml(geometry: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<DDM xmlns:gml="{}">
    <spatial>
        {}
    </spatial>
</DDM>
"#,
        GML_NS, geometry
    )
}

pub fn point(pos: &str) -> String {
    format!("<gml:Point><gml:pos>{}</gml:pos></gml:Point>", pos)
}

pub fn envelope(lower: &str, upper: &str) -> String {
    format!(
        "<gml:Envelope srsName=\"urn:ogc:def:crs:EPSG::28992\">\
         <gml:lowerCorner>{}</gml:lowerCorner><gml:upperCorner>{}</gml:upperCorner>\
         </gml:Envelope>",
        lower, upper
    )
}

pub fn bag_info_with_identity() -> String {
    format!(
        "Created: 2024-03-01T12:00:00.000+01:00\n\
         Has-Organizational-Identifier: {}\n\
         Is-Version-Of: {}\n\
         Data-Station-User-Account: {}\n",
        ORGANIZATIONAL_ID, SWORD_TOKEN, ACCOUNT
    )
}

pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Registry with the permissive test schemas under the default keys
pub fn test_registry() -> Arc<SchemaRegistry> {
    let libxml2 = LibXml2Wrapper::new();
    let mut registry = SchemaRegistry::new();
    registry.insert(
        "dataset.xml",
        libxml2
            .parse_schema_from_memory(DATASET_XSD.as_bytes())
            .expect("dataset schema compiles"),
    );
    registry.insert(
        "files.xml",
        libxml2
            .parse_schema_from_memory(FILES_XSD.as_bytes())
            .expect("files schema compiles"),
    );
    Arc::new(registry)
}

/// A bag on disk, removed when dropped
pub struct TestBag {
    _dir: TempDir,
    root: PathBuf,
}

impl TestBag {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.root.join(relative)).unwrap();
    }

    pub fn context(&self) -> Context {
        Context::new(&self.root, test_registry())
    }
}

/// Builds a structurally valid bag: `bagit.txt`, `bag-info.txt`, both metadata documents
/// and a sha256 manifest covering every payload file added through [`BagBuilder::payload`].
pub struct BagBuilder {
    bag_info: String,
    dataset_xml: Option<String>,
    files_xml: Option<String>,
    payload: Vec<(String, Vec<u8>)>,
    unlisted: Vec<(String, Vec<u8>)>,
}

impl Default for BagBuilder {
    fn default() -> Self {
        Self {
            bag_info: bag_info_with_identity(),
            dataset_xml: Some(dataset_xml(&point("126466 529006"))),
            files_xml: Some(FILES_XML.to_string()),
            payload: vec![("data/a.txt".to_string(), b"alpha".to_vec())],
            unlisted: Vec::new(),
        }
    }
}

impl BagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bag_info(mut self, content: &str) -> Self {
        self.bag_info = content.to_string();
        self
    }

    pub fn dataset_xml(mut self, content: impl Into<String>) -> Self {
        self.dataset_xml = Some(content.into());
        self
    }

    pub fn without_dataset_xml(mut self) -> Self {
        self.dataset_xml = None;
        self
    }

    pub fn files_xml(mut self, content: impl Into<String>) -> Self {
        self.files_xml = Some(content.into());
        self
    }

    pub fn payload(mut self, relative: &str, content: &[u8]) -> Self {
        self.payload.push((relative.to_string(), content.to_vec()));
        self
    }

    /// Payload file left out of every manifest
    pub fn unlisted_payload(mut self, relative: &str, content: &[u8]) -> Self {
        self.unlisted.push((relative.to_string(), content.to_vec()));
        self
    }

    pub fn build(self) -> TestBag {
        let dir = TempDir::new().unwrap();
        let bag = TestBag {
            root: dir.path().join("bag"),
            _dir: dir,
        };

        bag.write("bagit.txt", "BagIt-Version: 1.0\nTag-File-Character-Encoding: UTF-8\n");
        bag.write("bag-info.txt", &self.bag_info);
        if let Some(dataset) = &self.dataset_xml {
            bag.write("metadata/dataset.xml", dataset);
        }
        if let Some(files) = &self.files_xml {
            bag.write("metadata/files.xml", files);
        }

        let mut manifest = String::new();
        for (relative, content) in &self.payload {
            bag.write(relative, content);
            manifest.push_str(&format!("{}  {}\n", sha256_hex(content), relative));
        }
        for (relative, content) in &self.unlisted {
            bag.write(relative, content);
        }
        bag.write("manifest-sha256.txt", manifest);

        bag
    }
}
