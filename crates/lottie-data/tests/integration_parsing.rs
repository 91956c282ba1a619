use lottie_data::model::{LottieJson, Shape, Value};
use std::fs::File;
use std::io::BufReader;

fn open_fixture(name: &str) -> LottieJson {
    let path = format!("{}/tests/{}", env!("CARGO_MANIFEST_DIR"), name);
    let file = File::open(&path).unwrap_or_else(|e| panic!("Failed to open {}: {}", path, e));
    serde_json::from_reader(BufReader::new(file))
        .unwrap_or_else(|e| panic!("Failed to parse {}: {}", name, e))
}

#[test]
fn test_parse_bouncing_square() {
    let lottie = open_fixture("bouncing_square.json");
    assert_eq!((lottie.w, lottie.h), (200, 200));
    assert_eq!(lottie.layers.len(), 3);

    let square = &lottie.layers[0];
    assert_eq!(square.parent, Some(3));
    let masks = square.masks_properties.as_ref().expect("square has a mask");
    assert_eq!(masks[0].mode.as_deref(), Some("i"));

    let shapes = square.shapes.as_ref().expect("square has shapes");
    match &shapes[0] {
        Shape::Group(group) => assert_eq!(group.it.len(), 4),
        other => panic!("Expected group, got {:?}", other),
    }

    let rig = &lottie.layers[2];
    assert_eq!(rig.ty, 3);
    match &rig.ks.rz.k {
        Value::Animated(frames) => assert_eq!(frames.len(), 2),
        other => panic!("Expected animated rotation, got {:?}", other),
    }
}
