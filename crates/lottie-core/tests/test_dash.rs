use lottie_core::{DashPattern, LottiePlayer, RenderNode};
use serde_json::{json, Value};

// A 100x100 rect followed by the given stroke item.
fn stroke_animation(stroke: Value) -> Vec<u8> {
    json!({
        "v": "5.7.0", "ip": 0, "op": 60, "fr": 60, "w": 100, "h": 100,
        "layers": [{
            "ty": 4, "ind": 1, "nm": "Stroke Layer", "ip": 0, "op": 60, "st": 0,
            "ks": {},
            "shapes": [
                { "ty": "rc", "s": { "a": 0, "k": [100, 100] }, "p": { "a": 0, "k": [50, 50] } },
                stroke
            ]
        }]
    })
    .to_string()
    .into_bytes()
}

fn dash_entry(name: &str, value: f32) -> Value {
    json!({ "n": name, "nm": name, "v": { "a": 0, "k": value } })
}

fn solid_stroke(dashes: Vec<Value>) -> Value {
    json!({
        "ty": "st", "c": { "a": 0, "k": [0, 0, 0, 1] }, "o": { "a": 0, "k": 100 },
        "w": { "a": 0, "k": 2 }, "lc": 2, "lj": 2, "d": dashes
    })
}

fn extract_stroke_dash(bytes: &[u8]) -> Option<DashPattern> {
    let player = LottiePlayer::load(bytes).unwrap();
    let tree = player.render_tree();

    let RenderNode::Group(root) = &tree.root else {
        return None;
    };
    let RenderNode::Group(layer) = &root.children[0] else {
        return None;
    };
    match &layer.children[0] {
        RenderNode::Shape(shape) => shape.stroke.as_ref()?.dash.clone(),
        _ => None,
    }
}

#[test]
fn test_dash_v_support() {
    let stroke = solid_stroke(vec![dash_entry("v", 10.0)]);
    let dash = extract_stroke_dash(&stroke_animation(stroke)).expect("Dash should be present");

    // Expect duplication: [10, 10]
    assert_eq!(dash.array, vec![10.0, 10.0]);
}

#[test]
fn test_dash_gap_support() {
    let stroke = solid_stroke(vec![dash_entry("d", 10.0), dash_entry("g", 5.0)]);
    let dash = extract_stroke_dash(&stroke_animation(stroke)).expect("Dash should be present");

    assert_eq!(dash.array, vec![10.0, 5.0]);
}

#[test]
fn test_offset_normalization_positive_huge() {
    let stroke = solid_stroke(vec![dash_entry("d", 10.0), dash_entry("o", 2025.0)]);
    let dash = extract_stroke_dash(&stroke_animation(stroke)).expect("Dash should be present");

    // [10, 10], total 20: 2025 % 20 = 5.
    assert!((dash.offset - 5.0).abs() < 0.001, "Expected offset 5.0, got {}", dash.offset);
}

#[test]
fn test_offset_normalization_negative() {
    let stroke = solid_stroke(vec![dash_entry("d", 10.0), dash_entry("o", -5.0)]);
    let dash = extract_stroke_dash(&stroke_animation(stroke)).expect("Dash should be present");

    assert!((dash.offset - 15.0).abs() < 0.001, "Expected offset 15.0, got {}", dash.offset);
}

#[test]
fn test_no_dash_entries_means_solid_line() {
    let stroke = solid_stroke(vec![]);
    assert_eq!(extract_stroke_dash(&stroke_animation(stroke)), None);
}

#[test]
fn test_gradient_stroke_dash() {
    let stroke = json!({
        "ty": "gs", "o": { "a": 0, "k": 100 }, "w": { "a": 0, "k": 4 },
        "s": { "a": 0, "k": [0, 0] }, "e": { "a": 0, "k": [100, 0] }, "t": 1,
        "g": { "p": 2, "k": { "a": 0, "k": [0, 1, 0, 0, 1, 0, 0, 1] } },
        "d": [dash_entry("d", 20.0), dash_entry("g", 10.0), dash_entry("o", 35.0)]
    });
    let dash = extract_stroke_dash(&stroke_animation(stroke)).expect("Dash should be present");

    // [20, 10], total 30: offset 35 -> 5.
    assert_eq!(dash.array, vec![20.0, 10.0]);
    assert!((dash.offset - 5.0).abs() < 0.001);
}
