//! ResX serialization for migration resources

use crate::document::escape;
use indexmap::IndexMap;

const RESX_HEADER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<root>
  <resheader name="resmimetype">
    <value>text/microsoft-resx</value>
  </resheader>
  <resheader name="version">
    <value>2.0</value>
  </resheader>
  <resheader name="reader">
    <value>System.Resources.ResXResourceReader, System.Windows.Forms, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089</value>
  </resheader>
  <resheader name="writer">
    <value>System.Resources.ResXResourceWriter, System.Windows.Forms, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089</value>
  </resheader>
"#;

/// Render string resources as a ResX document, keeping key order
pub fn to_resx(resources: &IndexMap<String, String>) -> String {
    let mut out = String::from(RESX_HEADER);
    for (key, value) in resources {
        out.push_str(&format!(
            "  <data name=\"{}\" xml:space=\"preserve\">\n    <value>{}</value>\n  </data>\n",
            escape(key),
            escape(value)
        ));
    }
    out.push_str("</root>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::XmlDocument;

    #[test]
    fn test_resources_become_data_elements() {
        let mut resources = IndexMap::new();
        resources.insert("Target".to_string(), "H4sIAAAA<model/>".to_string());
        resources.insert("DefaultSchema".to_string(), "dbo".to_string());

        let resx = to_resx(&resources);
        let doc = XmlDocument::parse(&resx).unwrap();
        let data: Vec<_> = doc.descendants_named("data").collect();
        assert_eq!(data.len(), 2);
        assert_eq!(doc.element(data[0]).attribute("name"), Some("Target"));

        let values: Vec<&str> = doc
            .descendants_named("value")
            .map(|v| doc.element(v).text())
            .collect();
        assert_eq!(values[4], "H4sIAAAA<model/>");
        assert_eq!(values[5], "dbo");
    }
}
