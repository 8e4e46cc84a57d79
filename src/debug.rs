use crate::math::Point2d;
use crate::VehicleId;
#[cfg(feature = "debug")]
use serde_json::json;

#[cfg(feature = "debug")]
thread_local!(
    static DEBUG_FRAME: std::cell::RefCell<Vec<serde_json::Value>> = Default::default();
);

/// Records a sensor ray or similar segment cast by a vehicle.
#[allow(unused)]
pub fn debug_line(name: &str, vehicle: VehicleId, from: Point2d, to: Point2d) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "line",
            "name": name,
            "vehicle": vehicle,
            "from": [from.x, from.y],
            "to": [to.x, to.y],
        }))
    })
}

/// Records a marker around a vehicle.
#[allow(unused)]
pub fn debug_circle(name: &str, vehicle: VehicleId, centre: Point2d, radius: f64) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "circle",
            "name": name,
            "vehicle": vehicle,
            "centre": [centre.x, centre.y],
            "radius": radius,
        }))
    })
}

/// Drains the records of the current frame, tagged with the frame index.
#[cfg(feature = "debug")]
pub fn take_debug_frame(frame_idx: usize) -> serde_json::Value {
    let records = DEBUG_FRAME.with(|frame| frame.take());
    json!({
        "frame": frame_idx,
        "records": records,
    })
}

#[cfg(all(test, feature = "debug"))]
mod test {
    use super::*;
    use slotmap::Key;

    #[test]
    fn frame_is_drained() {
        let vehicle = VehicleId::null();
        take_debug_frame(0);
        debug_line("sensor", vehicle, Point2d::new(0.0, 0.0), Point2d::new(3.0, 4.0));
        debug_circle("stop", vehicle, Point2d::new(1.0, 1.0), 10.0);

        let frame = take_debug_frame(7);
        assert_eq!(frame["frame"], 7);
        let records = frame["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["to"], json!([3.0, 4.0]));
        assert_eq!(records[0]["vehicle"], json!(vehicle));
        assert_eq!(records[1]["type"], "circle");
        assert_eq!(take_debug_frame(8)["records"], json!([]));
    }
}
