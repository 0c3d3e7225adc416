use std::sync::Arc;

use odata_json_light::edm::{EdmModel, EdmTypeRef, ModelBuilder, PrimitiveKind, StructuredType};
use odata_json_light::{
    resource_to_string, write_collection, write_property, CollectionValue, DeletedEntry, DeletedReason, DeltaLink,
    DeltaResourceSet, DeltaWriter, Error, JsonLightOptions, Model, NavigationSource, NestedResourceInfo,
    OutputContext, Operation, PrimitiveValue, Property, Resource, ResourceSet, ResourceWriter, TypeAnnotation,
    Value, WriterState,
};

fn model() -> Arc<dyn EdmModel> {
    ModelBuilder::new()
        .structured_type(
            StructuredType::complex("NS.Address").property("City", EdmTypeRef::primitive(PrimitiveKind::String)),
        )
        .structured_type(
            StructuredType::complex("NS.HomeAddress")
                .base("NS.Address")
                .property("Floor", EdmTypeRef::primitive(PrimitiveKind::Int32)),
        )
        .structured_type(
            StructuredType::entity("NS.Customer")
                .key("Id")
                .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null())
                .property("Name", EdmTypeRef::primitive(PrimitiveKind::String))
                .property("Address", EdmTypeRef::complex("NS.Address"))
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

fn json(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap()
}

#[test]
fn test_undeclared_non_finite_double_carries_type() {
    let customer = Resource::new().with_property("UndeclaredDoubleProperty", f64::INFINITY);
    let output = resource_to_string(&customer, Model::empty(), JsonLightOptions::minimal()).unwrap();
    assert_eq!(
        output,
        r##"{"UndeclaredDoubleProperty@odata.type":"#Double","UndeclaredDoubleProperty":"INF"}"##
    );

    let output = resource_to_string(&customer, Model::empty(), JsonLightOptions::none()).unwrap();
    assert_eq!(output, r#"{"UndeclaredDoubleProperty":"INF"}"#);
}

#[test]
fn test_omit_odata_prefix() {
    let options = JsonLightOptions::full().with_omit_odata_prefix(true);
    let customer = Resource::of_type("NS.Customer")
        .with_etag("W/\"3\"")
        .with_property("Id", 3i32);
    let output = resource_to_string(&customer, model(), options).unwrap();
    assert_eq!(output, r##"{"@type":"#NS.Customer","@etag":"W/\"3\"","Id":3}"##);
}

#[test]
fn test_derived_complex_property_is_named_under_minimal() {
    let address = Resource::of_type("NS.HomeAddress")
        .with_property("City", "Oslo")
        .with_property("Floor", 2i32);
    let customer = Resource::of_type("NS.Customer")
        .with_property("Id", 1i32)
        .with_property("Address", address);
    let output = resource_to_string(&customer, model(), JsonLightOptions::minimal()).unwrap();
    assert_eq!(
        output,
        r##"{"Id":1,"Address":{"@odata.type":"#NS.HomeAddress","City":"Oslo","Floor":2}}"##
    );
}

#[test]
fn test_serialization_type_annotation_wins() {
    let customer = Resource::of_type("NS.Customer")
        .with_type_annotation(TypeAnnotation::new("NS.Customer"))
        .with_property("Id", 1i32);
    let output = resource_to_string(&customer, model(), JsonLightOptions::minimal()).unwrap();
    assert_eq!(output, r##"{"@odata.type":"#NS.Customer","Id":1}"##);

    let output = resource_to_string(&customer, model(), JsonLightOptions::none()).unwrap();
    assert_eq!(output, r#"{"Id":1}"#);
}

#[test]
fn test_ieee754_compatible_int64() {
    let options = JsonLightOptions::minimal().with_ieee754_compatible(true);
    let resource = Resource::new()
        .with(Property::new("Big", 9_007_199_254_740_993i64).with_type_annotation(TypeAnnotation::suppress()));
    let output = resource_to_string(&resource, Model::empty(), options).unwrap();
    assert_eq!(output, r#"{"Big":"9007199254740993"}"#);
}

#[test]
fn test_mixed_collection_is_rejected() {
    let mixed = CollectionValue::new(
        Some("Collection(Edm.String)"),
        vec![Value::from("a"), Value::from(Resource::new())],
    );
    let resource = Resource::new().with_property("Tags", mixed);
    let err = resource_to_string(&resource, Model::empty(), JsonLightOptions::minimal()).unwrap_err();
    assert_eq!(err, Error::MixedCollection("Tags".into()));
}

#[test]
fn test_open_collection_without_type_name_is_rejected() {
    let untyped = CollectionValue::new(None, vec![Value::from("a")]);
    let resource = Resource::new().with_property("Tags", untyped);
    let err = resource_to_string(&resource, Model::empty(), JsonLightOptions::minimal()).unwrap_err();
    assert_eq!(err.message_key(), "missing_type_name");
}

#[test]
fn test_resource_set_with_count_and_next_link() {
    let mut ctx = OutputContext::new(model(), JsonLightOptions::minimal());
    let mut writer =
        ResourceWriter::new(&mut ctx).with_navigation_source(NavigationSource::new("http://host/", "Customers"));
    writer
        .write_start_resource_set(
            &ResourceSet::new()
                .with_count(2)
                .with_next_link("http://host/Customers?$skip=2"),
        )
        .unwrap();
    for id in 1..=2 {
        writer
            .write_start_resource(&Resource::of_type("NS.Customer").with_property("Id", id))
            .unwrap();
        writer.write_end().unwrap();
    }
    writer.write_end().unwrap();
    assert_eq!(writer.state(), WriterState::Completed);
    drop(writer);

    assert_eq!(
        json(ctx.output()),
        json(concat!(
            r#"{"@odata.context":"http://host/$metadata#Customers","@odata.count":2,"#,
            r#""value":[{"Id":1},{"Id":2}],"@odata.nextLink":"http://host/Customers?$skip=2"}"#
        ))
    );
}

#[test]
fn test_expanded_single_resource() {
    let mut ctx = OutputContext::new(model(), JsonLightOptions::minimal());
    let mut writer = ResourceWriter::new(&mut ctx);
    writer
        .write_start_resource(&Resource::of_type("NS.Customer").with_property("Id", 1i32))
        .unwrap();
    writer
        .write_start_nested(&NestedResourceInfo::new("Orders").collection(false))
        .unwrap();
    writer
        .write_start_resource(&Resource::of_type("NS.Order").with_property("Id", 8i32))
        .unwrap();
    assert_eq!(writer.state(), WriterState::Resource);
    writer.write_end().unwrap();
    assert_eq!(writer.state(), WriterState::NestedResourceInfoWithContent);
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    drop(writer);

    assert_eq!(ctx.output(), r#"{"Id":1,"Orders":{"Id":8}}"#);
}

#[test]
fn test_write_end_at_start_is_rejected() {
    let mut ctx = OutputContext::new(model(), JsonLightOptions::minimal());
    let mut writer = ResourceWriter::new(&mut ctx);
    let err = writer.write_end().unwrap_err();
    assert_eq!(err.message_key(), "invalid_state");
    assert_eq!(writer.state(), WriterState::Exception);
}

#[test]
fn test_duplicate_operation_targets() {
    let resource = Resource::new()
        .with_action(Operation::new("#NS.Rate").with_target("Customers(1)/NS.Rate"))
        .with_action(Operation::new("#NS.Rate").with_target("Customers(1)/NS.Rate"));
    let err = resource_to_string(&resource, Model::empty(), JsonLightOptions::full()).unwrap_err();
    assert_eq!(err.message_key(), "duplicate_operation_target");
}

#[test]
fn test_grouped_operations_need_targets() {
    let resource = Resource::new()
        .with_action(Operation::new("#NS.Rate").with_target("Customers(1)/NS.Rate"))
        .with_function(Operation::new("#NS.Rate"));
    let err = resource_to_string(&resource, Model::empty(), JsonLightOptions::full()).unwrap_err();
    assert_eq!(err.message_key(), "operation_without_target");

    let resource = Resource::new()
        .with_action(Operation::new("#NS.Rate").with_target("Customers(1)/NS.Rate"))
        .with_action(Operation::new("#NS.Rate").with_target("Customers(2)/NS.Rate"));
    let output = resource_to_string(&resource, Model::empty(), JsonLightOptions::full()).unwrap();
    assert_eq!(
        output,
        r##"{"#NS.Rate":[{"target":"Customers(1)/NS.Rate"},{"target":"Customers(2)/NS.Rate"}]}"##
    );
}

#[test]
fn test_top_level_complex_property_is_inline() {
    let mut ctx = OutputContext::new(model(), JsonLightOptions::minimal());
    let address = Resource::of_type("NS.Address").with_property("City", "Oslo");
    let declared = EdmTypeRef::complex("NS.Address");
    write_property(&mut ctx, None, &Property::new("Address", address), Some(&declared)).unwrap();
    assert_eq!(ctx.output(), r#"{"City":"Oslo"}"#);
}

#[test]
fn test_top_level_collection_in_request_is_named() {
    let options = JsonLightOptions::minimal().with_message_kind(odata_json_light::MessageKind::Request);
    let mut ctx = OutputContext::new(Model::empty(), options);
    let tags = CollectionValue::new(Some("Collection(Edm.String)"), vec![Value::from("a"), Value::from("b")]);
    let item = EdmTypeRef::primitive(PrimitiveKind::String);
    write_collection(&mut ctx, None, &tags, Some(&item)).unwrap();
    assert_eq!(
        ctx.output(),
        r##"{"@odata.type":"#Collection(String)","value":["a","b"]}"##
    );
}

#[test]
fn test_decimal_keeps_its_digits() {
    let resource = Resource::new().with(
        Property::new("Amount", PrimitiveValue::Decimal("12345678901234567890.125".into()))
            .with_type_annotation(TypeAnnotation::suppress()),
    );
    let output = resource_to_string(&resource, Model::empty(), JsonLightOptions::minimal()).unwrap();
    assert_eq!(output, r#"{"Amount":12345678901234567890.125}"#);
}

#[test]
fn test_delta_writer_resources_and_links() {
    let mut ctx = OutputContext::new(model(), JsonLightOptions::minimal());
    let mut writer =
        DeltaWriter::new(&mut ctx).with_navigation_source(NavigationSource::new("http://host/", "Customers"));
    writer.write_start(&DeltaResourceSet::new().with_count(3)).unwrap();
    writer
        .write_start_resource(&Resource::of_type("NS.Customer").with_property("Id", 1i32))
        .unwrap();
    writer.write_end().unwrap();
    writer
        .write_deleted_entry(&DeletedEntry::new("Customers(2)", DeletedReason::Changed))
        .unwrap();
    writer
        .write_delta_link(&DeltaLink::new("Customers(1)", "Orders", "Orders(3)"))
        .unwrap();
    writer.write_end().unwrap();
    drop(writer);

    assert_eq!(
        json(ctx.output()),
        json(concat!(
            r#"{"@odata.context":"http://host/$metadata#Customers/$delta","@odata.count":3,"value":["#,
            r#"{"Id":1},"#,
            r#"{"@odata.context":"http://host/$metadata#Customers/$deletedEntity","id":"Customers(2)","reason":"changed"},"#,
            r#"{"@odata.context":"http://host/$metadata#Customers/$link","source":"Customers(1)","relationship":"Orders","target":"Orders(3)"}"#,
            r#"]}"#
        ))
    );
}

#[test]
fn test_delta_writer_rejects_deleted_entry_inside_resource() {
    let mut ctx = OutputContext::new(model(), JsonLightOptions::minimal());
    let mut writer = DeltaWriter::new(&mut ctx);
    writer.write_start(&DeltaResourceSet::new()).unwrap();
    writer
        .write_start_resource(&Resource::of_type("NS.Customer").with_property("Id", 1i32))
        .unwrap();
    let err = writer
        .write_deleted_entry(&DeletedEntry::new("Customers(2)", DeletedReason::Deleted))
        .unwrap_err();
    assert_eq!(err.message_key(), "invalid_state");
}
