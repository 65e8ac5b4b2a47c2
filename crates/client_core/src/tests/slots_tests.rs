use super::*;

#[test]
fn default_day_has_fifteen_slots() {
    let labels: Vec<String> = default_time_slots()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(labels.len(), 15);
    assert_eq!(labels.first().map(String::as_str), Some("9:00"));
    assert_eq!(labels[1], "9:30");
    assert_eq!(labels[labels.len() - 2], "15:30");
    assert_eq!(labels.last().map(String::as_str), Some("16:00"));
    assert!(!labels.contains(&"16:30".to_string()));
}

#[test]
fn empty_or_inverted_range_yields_nothing() {
    assert!(generate_time_slots(17, 17).is_empty());
    assert!(generate_time_slots(18, 9).is_empty());
    assert_eq!(
        generate_time_slots(10, 11),
        vec![TimeSlot {
            hour: 10,
            minute: 0
        }]
    );
}

#[test]
fn slot_converts_to_wall_clock_time() {
    let slot = TimeSlot {
        hour: 14,
        minute: 30,
    };
    assert_eq!(
        slot.to_naive_time(),
        NaiveTime::from_hms_opt(14, 30, 0)
    );
}
