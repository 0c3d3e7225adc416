use std::sync::Arc;

use odata_json_light::edm::{EdmModel, EdmTypeRef, ModelBuilder, PrimitiveKind, StructuredType};
use odata_json_light::{
    resource_from_str, resource_to_string, JsonLightOptions, NavigationSource, OutputContext, PrimitiveValue,
    Resource, ResourceSet, ResourceWriter, TypeAnnotation, TypeNameOracle, Value,
};

fn model() -> Arc<dyn EdmModel> {
    ModelBuilder::new()
        .structured_type(
            StructuredType::complex("NS.Address").property("City", EdmTypeRef::primitive(PrimitiveKind::String)),
        )
        .structured_type(
            StructuredType::entity("NS.Item")
                .key("Id")
                .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null())
                .open(),
        )
        .structured_type(StructuredType::entity("NS.SpecialItem").base("NS.Item"))
        .entity_set("Items", "NS.Item")
        .build()
}

fn item() -> Resource {
    Resource::of_type("NS.Item")
        .with_property("Id", 1i32)
        .with_property("Small", 3i16)
        .with_property("Label", "x")
        .with_property("Ratio", f64::NAN)
        .with_property("Address", Resource::of_type("NS.Address").with_property("City", "Oslo"))
}

#[test]
fn test_dynamic_properties_per_level() {
    let full = resource_to_string(&item(), model(), JsonLightOptions::full()).unwrap();
    assert_eq!(
        full,
        concat!(
            r##"{"@odata.type":"#NS.Item","Id":1,"Small@odata.type":"#Int16","Small":3,"Label":"x","##,
            r##""Ratio@odata.type":"#Double","Ratio":"NaN","##,
            r##""Address":{"@odata.type":"#NS.Address","City":"Oslo"}}"##
        )
    );

    let minimal = resource_to_string(&item(), model(), JsonLightOptions::minimal()).unwrap();
    assert_eq!(
        minimal,
        concat!(
            r##"{"Id":1,"Small@odata.type":"#Int16","Small":3,"Label":"x","##,
            r##""Ratio@odata.type":"#Double","Ratio":"NaN","##,
            r##""Address":{"@odata.type":"#NS.Address","City":"Oslo"}}"##
        )
    );

    let none = resource_to_string(&item(), model(), JsonLightOptions::none()).unwrap();
    assert_eq!(
        none,
        r#"{"Id":1,"Small":3,"Label":"x","Ratio":"NaN","Address":{"City":"Oslo"}}"#
    );
}

#[test]
fn test_dynamic_types_survive_reading() {
    for options in [JsonLightOptions::full(), JsonLightOptions::minimal()] {
        let json = resource_to_string(&item(), model(), options.clone()).unwrap();
        let back = resource_from_str(&json, model(), options, Some("NS.Item")).unwrap();
        assert_eq!(back.property("Small"), Some(&Value::from(3i16)));
        assert!(matches!(
            back.property("Ratio"),
            Some(Value::Primitive(PrimitiveValue::Double(d))) if d.is_nan()
        ));
        let address = back.property("Address").and_then(Value::as_resource).unwrap();
        assert_eq!(address.type_name.as_deref(), Some("NS.Address"));
    }
}

#[test]
fn test_derived_item_in_set_is_named() {
    let mut ctx = OutputContext::new(model(), JsonLightOptions::minimal());
    let mut writer =
        ResourceWriter::new(&mut ctx).with_navigation_source(NavigationSource::new("http://host/", "Items"));
    writer.write_start_resource_set(&ResourceSet::new()).unwrap();
    writer
        .write_start_resource(&Resource::of_type("NS.Item").with_property("Id", 1i32))
        .unwrap();
    writer.write_end().unwrap();
    writer
        .write_start_resource(&Resource::of_type("NS.SpecialItem").with_property("Id", 2i32))
        .unwrap();
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    drop(writer);

    assert_eq!(
        ctx.output(),
        concat!(
            r##"{"@odata.context":"http://host/$metadata#Items","value":["##,
            r##"{"Id":1},{"@odata.type":"#NS.SpecialItem","Id":2}]}"##
        )
    );
}

#[test]
fn test_annotation_equal_to_expected_is_still_written() {
    let resource = Resource::of_type("NS.Item")
        .with_type_annotation(TypeAnnotation::new("NS.Item"))
        .with_property("Id", 1i32);
    for options in [JsonLightOptions::full(), JsonLightOptions::minimal()] {
        let json = resource_to_string(&resource, model(), options).unwrap();
        assert!(json.starts_with(r##"{"@odata.type":"#NS.Item""##), "{}", json);
    }
}

#[test]
fn test_oracle_follows_options() {
    let ctx = OutputContext::new(model(), JsonLightOptions::none());
    assert_eq!(ctx.oracle(), TypeNameOracle::NoMetadata);
    let ctx = OutputContext::new(model(), JsonLightOptions::full());
    assert_eq!(ctx.oracle(), TypeNameOracle::FullMetadata);
}
