use std::sync::Arc;

use serde::Serialize;

use odata_json_light::edm::{EdmModel, EdmTypeRef, ModelBuilder, PrimitiveKind, StructuredType};
use odata_json_light::{
    resource_from_reader, resource_to_string, resource_to_writer, to_resource, InputContext, JsonLightOptions,
    NavigationSource, NestedResourceInfo, OutputContext, ReaderItem, ReaderState, Resource, ResourceReader,
    ResourceSet, ResourceWriter, Value,
};

#[derive(Serialize)]
struct Customer {
    #[serde(rename = "Id")]
    id: i32,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Tags")]
    tags: Vec<String>,
    #[serde(rename = "Score")]
    score: f64,
}

fn model() -> Arc<dyn EdmModel> {
    ModelBuilder::new()
        .structured_type(
            StructuredType::entity("NS.Customer")
                .key("Id")
                .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null())
                .property("Name", EdmTypeRef::primitive(PrimitiveKind::String))
                .property("Tags", EdmTypeRef::collection(EdmTypeRef::primitive(PrimitiveKind::String)))
                .property("Score", EdmTypeRef::primitive(PrimitiveKind::Double))
                .navigation("Orders", "NS.Order", true),
        )
        .structured_type(
            StructuredType::entity("NS.Order")
                .key("Id")
                .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null()),
        )
        .entity_set("Customers", "NS.Customer")
        .build()
}

#[test]
fn test_serde_struct_round_trip() {
    let customer = Customer {
        id: 42,
        name: "Alice".to_string(),
        tags: vec!["vip".to_string(), "early".to_string()],
        score: 2.0,
    };
    let resource = to_resource(Some("NS.Customer"), &customer).unwrap();

    let json = resource_to_string(&resource, model(), JsonLightOptions::minimal()).unwrap();
    assert_eq!(json, r#"{"Id":42,"Name":"Alice","Tags":["vip","early"],"Score":2.0}"#);

    let mut buffer = Vec::new();
    resource_to_writer(&mut buffer, &resource, model(), JsonLightOptions::full()).unwrap();
    let back = resource_from_reader(&buffer[..], model(), JsonLightOptions::full(), None).unwrap();
    assert_eq!(back.type_name.as_deref(), Some("NS.Customer"));
    assert_eq!(back.property("Id"), Some(&Value::from(42i32)));
    assert_eq!(back.property("Score"), Some(&Value::from(2.0f64)));
    let tags = back.property("Tags").and_then(Value::as_collection).unwrap();
    assert_eq!(tags.items, vec![Value::from("vip"), Value::from("early")]);
}

#[test]
fn test_expanded_set_round_trip() {
    let mut output = OutputContext::new(model(), JsonLightOptions::full());
    let mut writer =
        ResourceWriter::new(&mut output).with_navigation_source(NavigationSource::new("http://host/", "Customers"));
    writer.write_start_resource_set(&ResourceSet::new().with_count(1)).unwrap();
    writer
        .write_start_resource(&Resource::of_type("NS.Customer").with_property("Id", 1i32))
        .unwrap();
    writer.write_start_nested(&NestedResourceInfo::new("Orders")).unwrap();
    writer.write_start_resource_set(&ResourceSet::new()).unwrap();
    for id in [10i32, 11] {
        writer
            .write_start_resource(&Resource::of_type("NS.Order").with_property("Id", id))
            .unwrap();
        writer.write_end().unwrap();
    }
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    drop(writer);
    let json = output.into_string();

    let mut input = InputContext::from_str(&json, model(), JsonLightOptions::full());
    let mut reader =
        ResourceReader::resource_set(&mut input, None).with_navigation_source(NavigationSource::new("http://host/", "Customers"));
    let mut steps = Vec::new();
    while reader.read().unwrap() {
        steps.push((reader.state(), reader.item().clone()));
    }

    let states: Vec<_> = steps.iter().map(|(state, _)| *state).collect();
    assert_eq!(
        states,
        vec![
            ReaderState::ResourceSetStart,
            ReaderState::ResourceStart,
            ReaderState::NestedResourceInfoStart,
            ReaderState::ResourceSetStart,
            ReaderState::ResourceStart,
            ReaderState::ResourceEnd,
            ReaderState::ResourceStart,
            ReaderState::ResourceEnd,
            ReaderState::ResourceSetEnd,
            ReaderState::NestedResourceInfoEnd,
            ReaderState::ResourceEnd,
            ReaderState::ResourceSetEnd,
        ]
    );
    let orders = steps[2].1.as_nested_resource_info().unwrap();
    assert_eq!(orders.url.as_deref(), Some("http://host/Customers(1)/Orders"));
    match &steps[10].1 {
        ReaderItem::Resource(customer) => {
            assert_eq!(customer.id.as_deref(), Some("http://host/Customers(1)"));
            assert_eq!(customer.type_name.as_deref(), Some("NS.Customer"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(steps[0].1.as_resource_set().and_then(|s| s.count), Some(1));
}
