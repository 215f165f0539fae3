//! Elaboration end-to-end: port insertion, bussification, and module
//! unification.

use ferro_elab::{elaborate, ElabConfig, Elaboration, InstanceId};
use ferro_fixed::SignalType;
use ferro_ir::{CastMode, Design, Node, Value};

/// One leaf scope: increment the input and label the ports.
fn leaf(design: &mut Design, instance_name: &str, input: Node) -> Node {
    design.enter_scope(instance_name, "Leaf");
    design.input_name(input, "Data");
    let one = design.constant_f64(SignalType::ufix(8, 0), 1.0).unwrap();
    let sum = design.plus(&[input, one]).unwrap();
    let result = design
        .floor_cast(SignalType::ufix(8, 0), sum, CastMode::WrapAround)
        .unwrap();
    design.output_name(result, "Result");
    design.leave_scope();
    result
}

fn surviving_modules(elab: &Elaboration) -> Vec<(InstanceId, String)> {
    elab.instances
        .iter()
        .filter(|(_, instance)| instance.unified_with.is_none())
        .map(|(id, instance)| (id, instance.module_name.clone()))
        .collect()
}

#[test]
fn isomorphic_instances_unify_into_one_module() {
    let mut design = Design::new();
    let (shared, _) = design.signal(Value::zero_of(&SignalType::ufix(8, 0)));

    let a = leaf(&mut design, "first_core", shared);
    let b = leaf(&mut design, "second_core", shared);
    design.terminate(a);
    design.terminate(b);

    let elab = elaborate(&mut design, ElabConfig::default()).unwrap();

    let survivors = surviving_modules(&elab);
    let leaves: Vec<_> = survivors
        .iter()
        .filter(|(_, name)| name == "Leaf")
        .collect();
    assert_eq!(
        leaves.len(),
        1,
        "isomorphic leaf instances must collapse into one module: {survivors:?}"
    );

    // The duplicate is recorded as unified and both call sites target the
    // survivor.
    let unified_count = elab
        .instances
        .iter()
        .filter(|(_, instance)| instance.unified_with.is_some())
        .count();
    assert_eq!(unified_count, 1);

    let mut instantiations = 0;
    for (_, entity) in elab.entities.iter() {
        if entity.class == "instance" {
            if let Some(target) = entity.target_module {
                assert_eq!(elab.instances[elab.resolve(target)].module_name, "Leaf");
                instantiations += 1;
            }
        }
    }
    assert_eq!(instantiations, 2);
}

#[test]
fn different_leaves_stay_separate_modules() {
    let mut design = Design::new();
    let (shared, _) = design.signal(Value::zero_of(&SignalType::ufix(8, 0)));

    let a = leaf(&mut design, "first_core", shared);

    // A structurally different sibling: adds two instead of one.
    design.enter_scope("second_core", "OtherLeaf");
    let two = design.constant_f64(SignalType::ufix(8, 0), 2.0).unwrap();
    let sum = design.plus(&[shared, two]).unwrap();
    let b = design
        .floor_cast(SignalType::ufix(8, 0), sum, CastMode::WrapAround)
        .unwrap();
    design.leave_scope();

    design.terminate(a);
    design.terminate(b);

    let elab = elaborate(&mut design, ElabConfig::default()).unwrap();
    let names: Vec<String> = surviving_modules(&elab).into_iter().map(|(_, n)| n).collect();
    assert!(names.contains(&"Leaf".to_string()));
    assert!(names.contains(&"OtherLeaf".to_string()));
}

#[test]
fn no_edge_crosses_a_hierarchy_boundary_after_elaboration() {
    let mut design = Design::new();
    let (shared, _) = design.signal(Value::zero_of(&SignalType::ufix(8, 0)));
    let a = leaf(&mut design, "first_core", shared);
    let b = leaf(&mut design, "second_core", shared);
    design.terminate(a);
    design.terminate(b);

    let elab = elaborate(&mut design, ElabConfig::default()).unwrap();

    for (_, instance) in elab.instances.iter() {
        for entity_id in &instance.entities {
            let entity = &elab.entities[*entity_id];
            for input in &entity.inputs {
                if let Some((driver, _)) = input.driver {
                    assert_eq!(
                        elab.entities[driver].instance, entity.instance,
                        "driver of '{}' lives in a different instance",
                        entity.name
                    );
                }
            }
        }
    }
}

#[test]
fn labelled_ports_get_their_names() {
    let mut design = Design::new();
    let (shared, _) = design.signal(Value::zero_of(&SignalType::ufix(8, 0)));
    let out = leaf(&mut design, "core", shared);
    design.terminate(out);

    let elab = elaborate(&mut design, ElabConfig::default()).unwrap();

    let (leaf_id, _) = elab
        .instances
        .iter()
        .find(|(_, instance)| instance.module_name == "Leaf")
        .expect("leaf module exists");

    let input_names: Vec<String> = elab.instances[leaf_id]
        .input_ports
        .iter()
        .map(|port| elab.entities[*port].outputs[0].name.clone())
        .collect();
    let output_names: Vec<String> = elab.instances[leaf_id]
        .output_ports
        .iter()
        .map(|port| elab.entities[*port].inputs[0].name.clone())
        .collect();
    assert_eq!(input_names, vec!["Data".to_string()]);
    assert_eq!(output_names, vec!["Result".to_string()]);
}

#[test]
fn bus_labels_merge_into_bus_ports() {
    let mut design = Design::new();
    let sources: Vec<Node> = (0..3)
        .map(|_| design.signal(Value::zero_of(&SignalType::ufix(4, 0))).0)
        .collect();

    design.enter_scope("consumer", "Consumer");
    design.label_bus(&sources, "input", "Samples");
    let sum = design.plus(&sources).unwrap();
    design.output_name(sum, "Total");
    design.leave_scope();
    design.terminate(sum);

    let elab = elaborate(&mut design, ElabConfig::default()).unwrap();
    let (consumer, _) = elab
        .instances
        .iter()
        .find(|(_, instance)| instance.module_name == "Consumer")
        .expect("consumer module exists");

    let ports = &elab.instances[consumer].input_ports;
    assert_eq!(ports.len(), 1, "three scalars merge into one bus port");
    let port = &elab.entities[ports[0]];
    assert_eq!(port.outputs.len(), 3);
    assert_eq!(port.outputs[0].name, "Samples");
    assert_eq!(port.outputs[0].bus_size, Some(3));
    assert_eq!(port.outputs[2].bus_index, 2);
}

#[test]
fn bussification_can_be_disabled_per_module() {
    let mut design = Design::new();
    let sources: Vec<Node> = (0..2)
        .map(|_| design.signal(Value::zero_of(&SignalType::ufix(4, 0))).0)
        .collect();

    design.enter_scope("consumer", "Consumer");
    design.label_bus(&sources, "input", "Samples");
    let sum = design.plus(&sources).unwrap();
    design.output_name(sum, "Total");
    design.leave_scope();
    design.terminate(sum);

    let mut config = ElabConfig::default();
    config.module_bussification.insert("Consumer".into(), false);
    let elab = elaborate(&mut design, config).unwrap();

    let (consumer, _) = elab
        .instances
        .iter()
        .find(|(_, instance)| instance.module_name == "Consumer")
        .expect("consumer module exists");
    let names: Vec<String> = elab.instances[consumer]
        .input_ports
        .iter()
        .map(|port| elab.entities[*port].outputs[0].name.clone())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Samples_0".to_string()));
    assert!(names.contains(&"Samples_1".to_string()));
}
