use indexmap::IndexMap;
use slye_common::id::PresentationId;
use slye_common::types::Transformable;

use crate::document::{Document, DocumentComponent, DocumentPropValue, DocumentRef, DocumentStep};
use crate::error::SlyeSceneGraphError;
use crate::props::{PropValue, Props};
use crate::scene_graph::SceneGraph;

/// Encode a presentation into its portable document.
///
/// Steps and components are emitted in presentation order. Nested prop maps
/// cannot be represented and fail the whole call.
pub fn encode(
    graph: &SceneGraph,
    presentation: &PresentationId,
) -> Result<Document, SlyeSceneGraphError> {
    let node = graph.presentation(presentation)?;
    let mut steps = IndexMap::with_capacity(node.steps().len());

    for step_id in node.steps() {
        let step = graph.step(step_id)?;
        let mut components = Vec::with_capacity(step.components().len());
        for component_id in step.components() {
            let component = graph.component(component_id)?;
            let transform = component.transform();
            components.push(DocumentComponent {
                uuid: component_id.to_string(),
                module_name: component.module_name().to_string(),
                component: component.component_name().to_string(),
                position: transform.position,
                rotation: transform.rotation,
                scale: transform.scale,
                props: encode_props(component.props())?,
            });
        }
        let transform = step.transform();
        steps.insert(
            step_id.to_string(),
            DocumentStep {
                position: transform.position,
                rotation: transform.rotation,
                scale: transform.scale,
                components,
            },
        );
    }

    Ok(Document {
        template: node.template().cloned(),
        steps,
    })
}

pub fn encode_props(
    props: &Props,
) -> Result<IndexMap<String, DocumentPropValue>, SlyeSceneGraphError> {
    props
        .iter()
        .map(|(key, value)| Ok((key.clone(), encode_prop(key, value)?)))
        .collect()
}

fn encode_prop(key: &str, value: &PropValue) -> Result<DocumentPropValue, SlyeSceneGraphError> {
    Ok(match value {
        PropValue::Bool(v) => DocumentPropValue::Bool(*v),
        PropValue::Number(v) => DocumentPropValue::number(*v)
            .ok_or_else(|| SlyeSceneGraphError::UnsupportedPropType(key.to_string()))?,
        PropValue::String(v) => DocumentPropValue::String(v.clone()),
        PropValue::Font(font) => DocumentPropValue::Ref(DocumentRef::Font {
            font: font.name.clone(),
            module_name: font.module_name.clone(),
        }),
        PropValue::File(file) => DocumentPropValue::Ref(DocumentRef::File {
            uuid: file.uuid.clone(),
            module_id: file.module_name.clone(),
        }),
        PropValue::Map(_) => {
            return Err(SlyeSceneGraphError::UnsupportedPropType(key.to_string()));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;
    use crate::props::{File, Font};
    use crate::scene_graph::{ComponentNode, PresentationNode, StepNode, Template};
    use slye_common::types::{Transform, Vec3};

    fn build_graph() -> SceneGraph {
        let mut graph = SceneGraph::headless();
        graph.insert_presentation(PresentationNode::new("p")).unwrap();
        graph
            .set_template(
                &"p".into(),
                Some(Template {
                    module_name: "slye".to_string(),
                    component: "template".to_string(),
                }),
            )
            .unwrap();
        for id in ["s2", "s1"] {
            graph.insert_step(StepNode::new(id)).unwrap();
            graph.add_step(&"p".into(), &id.into(), None).unwrap();
        }
        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            ..Default::default()
        };
        graph
            .insert_component(
                ComponentNode::new(
                    "c1",
                    "slye",
                    "text",
                    props! {
                        "text" => "hi",
                        "font" => Font::new("slye", "Sahel"),
                        "bg" => File::new("f9"),
                    },
                )
                .with_transform(transform),
            )
            .unwrap();
        graph.add_component(&"s1".into(), &"c1".into(), None).unwrap();
        graph
    }

    #[test]
    fn test_encode_order_and_refs() {
        let doc = encode(&build_graph(), &"p".into()).unwrap();
        let keys: Vec<_> = doc.steps.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["s2", "s1"]);
        assert_eq!(doc.template.as_ref().unwrap().component, "template");

        let component = &doc.steps["s1"].components[0];
        assert_eq!(component.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(component.scale, Vec3::ONE);
        assert_eq!(
            component.props["font"],
            DocumentPropValue::Ref(DocumentRef::Font {
                font: "Sahel".to_string(),
                module_name: "slye".to_string()
            })
        );
        assert_eq!(
            component.props["bg"],
            DocumentPropValue::Ref(DocumentRef::File {
                uuid: "f9".to_string(),
                module_id: None
            })
        );
    }

    #[test]
    fn test_nested_props_are_rejected() {
        let mut graph = build_graph();
        graph
            .update_props(&"c1".into(), props! {"style" => props! {"bold" => true}})
            .unwrap();
        assert_eq!(
            encode(&graph, &"p".into()),
            Err(SlyeSceneGraphError::UnsupportedPropType("style".to_string()))
        );
    }

    #[test]
    fn test_encode_json_shape() {
        let doc = encode(&build_graph(), &"p".into()).unwrap();
        let json: serde_json::Value = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["steps"]["s1"]["components"][0]["moduleName"], "slye");
        assert_eq!(json["steps"]["s1"]["components"][0]["props"]["font"]["kind"], "FONT");
        assert_eq!(json["steps"]["s2"]["scale"], serde_json::json!([1.0, 1.0, 1.0]));
    }
}
