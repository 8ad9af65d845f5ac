use mongodb::bson::{Bson, doc};
use raptors_etl::EtlError;
use raptors_etl::config::Config;
use raptors_etl::controllers::{
    self, CleanBookingOptions, GenerateOptions, SyncOptions,
};
use raptors_etl::frame::Frame;
use raptors_etl::io::excel_write;
use raptors_etl::io::memory::MemoryStore;
use raptors_etl::model::Cell;
use tempfile::tempdir;

fn finance_sheet() -> Frame {
    Frame::from_rows(
        vec![
            "Fiscal_Week_ID",
            "Fiscal_Period_ID",
            "Fiscal_Quarter_ID",
            "Sales_Level_3",
            "Sales_Level_5",
            "Customer_Name",
            "Internal_Sub_Business_Entity_Name",
            "TMS_BL",
            "Scratch",
        ],
        vec![
            vec![
                Cell::Int(201806),
                Cell::Int(201802),
                Cell::text("2018Q1"),
                Cell::text("INDIA_COMM_1"),
                Cell::text("SL5_A"),
                Cell::text("acme"),
                Cell::text("SWITCHING"),
                Cell::Float(1200.0),
                Cell::text("drop me"),
            ],
            vec![
                Cell::Int(201806),
                Cell::Int(201802),
                Cell::text("2018Q1"),
                Cell::text("INDIA_COMM_1"),
                Cell::text("SL5_A"),
                Cell::Null,
                Cell::text("SWITCHING"),
                Cell::Float(300.0),
                Cell::Null,
            ],
        ],
    )
}

fn seeded_store() -> MemoryStore {
    MemoryStore::new("ccsdm")
        .with_collection(
            "booking_dump_cols",
            vec![doc! {
                "_id": 1,
                "tms_bl": "tms_sales_allocated_bookings_base_list",
                "scratch": "not_to_be_mapped",
            }],
        )
        .with_collection(
            "ent_dump_from_finance",
            vec![
                doc! { "fiscal_week_id": 201806_i64, "fiscal_period_id": 201802_i64, "stale": true },
                doc! { "fiscal_week_id": 201805_i64, "fiscal_period_id": 201802_i64, "sales_level_3": "INDIA_COMM_1" },
            ],
        )
        .with_collection(
            "tech_spec1",
            vec![doc! { "internal_sub_business_entity_name": "SWITCHING", "arch2": "EN" }],
        )
        .with_collection(
            "sl5_to_segments",
            vec![doc! { "sales_level_5": "SL5_A", "rm_name": "Asha", "segment": "Mid" }],
        )
        .with_collection(
            "master_unique_names",
            vec![doc! { "names": "acme", "acc_name": "acme corp", "grp_name": "acme group" }],
        )
}

#[test]
fn sensitive_sync_replaces_only_incoming_weeks() {
    let temp_dir = tempdir().expect("temporary directory");
    let input = temp_dir.path().join("finance.xlsx");
    excel_write::write_frame(&input, None, &finance_sheet()).expect("sheet written");
    let store = seeded_store();

    let report = controllers::sync(
        &store,
        &Config::default(),
        &SyncOptions {
            input,
            sheet: None,
            collection: "ent_dump_from_finance".to_string(),
        },
    )
    .expect("synced");

    assert_eq!(report.rows_read, 2);
    assert_eq!(report.purge.existing, 2);
    assert_eq!(report.purge.planned, 1);
    assert_eq!(report.purge.removed, report.purge.planned);
    assert_eq!(report.write.total, 3);

    let stored = store.documents("ent_dump_from_finance");
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0].get_i64("fiscal_week_id").unwrap(), 201805);
    let synced = &stored[1];
    assert_eq!(
        synced.get("tms_sales_allocated_bookings_base_list"),
        Some(&Bson::Int64(1200))
    );
    assert!(!synced.contains_key("scratch"));
    assert!(!synced.contains_key("not_to_be_mapped"));
    assert!(synced.get_datetime("timestamp").is_ok());
    assert_eq!(stored[2].get("customer_name"), Some(&Bson::Int64(0)));
}

#[test]
fn plain_sync_replaces_the_whole_collection() {
    let temp_dir = tempdir().expect("temporary directory");
    let input = temp_dir.path().join("tech.xlsx");
    let sheet = Frame::from_rows(
        vec!["Internal_Sub_Business_Entity_Name", "Arch2"],
        vec![vec![Cell::text("ROUTING"), Cell::text("EN")]],
    );
    excel_write::write_frame(&input, Some("Tech"), &sheet).expect("sheet written");
    let store = seeded_store();

    let report = controllers::sync(
        &store,
        &Config::default(),
        &SyncOptions {
            input,
            sheet: Some("Tech".to_string()),
            collection: "tech_spec1".to_string(),
        },
    )
    .expect("synced");

    assert_eq!(report.purge.removed, 1);
    let stored = store.documents("tech_spec1");
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].get_str("internal_sub_business_entity_name").unwrap(),
        "ROUTING"
    );
    assert!(!stored[0].contains_key("timestamp"));
}

#[test]
fn sync_without_rename_map_aborts() {
    let temp_dir = tempdir().expect("temporary directory");
    let input = temp_dir.path().join("sfdc.xlsx");
    let sheet = Frame::from_rows(vec!["Opportunity_ID"], vec![vec![Cell::Int(7)]]);
    excel_write::write_frame(&input, None, &sheet).expect("sheet written");
    let store = seeded_store();

    let error = controllers::sync(
        &store,
        &Config::default(),
        &SyncOptions {
            input,
            sheet: None,
            collection: "sfdc_raw_dump".to_string(),
        },
    )
    .unwrap_err();

    assert!(matches!(error, EtlError::CollectionMissing(name) if name == "sfdc_dump_cols"));
    assert!(store.documents("sfdc_raw_dump").is_empty());
}

#[test]
fn sensitive_sync_without_weeks_aborts() {
    let temp_dir = tempdir().expect("temporary directory");
    let input = temp_dir.path().join("weekless.xlsx");
    let sheet = Frame::from_rows(
        vec!["Customer_Name", "TMS_BL"],
        vec![vec![Cell::text("acme"), Cell::Float(10.0)]],
    );
    excel_write::write_frame(&input, None, &sheet).expect("sheet written");
    let store = seeded_store();
    let before = store.documents("ent_dump_from_finance");

    for _ in 0..2 {
        let error = controllers::sync(
            &store,
            &Config::default(),
            &SyncOptions {
                input: input.clone(),
                sheet: None,
                collection: "ent_dump_from_finance".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(
            error,
            EtlError::ColumnMissing { ref column, .. } if column == "fiscal_week_id"
        ));
    }

    assert_eq!(store.documents("ent_dump_from_finance"), before);
}

#[test]
fn synced_bookings_flow_into_a_report() {
    let temp_dir = tempdir().expect("temporary directory");
    let input = temp_dir.path().join("finance.xlsx");
    excel_write::write_frame(&input, None, &finance_sheet()).expect("sheet written");
    let store = seeded_store();
    let mut config = Config::default();
    config.paths.unmapped_dir = temp_dir.path().to_path_buf();
    config.paths.home_dir = temp_dir.path().to_path_buf();

    controllers::sync(
        &store,
        &config,
        &SyncOptions {
            input,
            sheet: None,
            collection: "ent_dump_from_finance".to_string(),
        },
    )
    .expect("synced");

    let cleaned = controllers::clean_booking_dump(
        &store,
        &config,
        &CleanBookingOptions {
            years: vec![2018],
            comm: true,
            ..CleanBookingOptions::default()
        },
    )
    .expect("cleaned");
    assert_eq!(cleaned.rows_read, 3);
    // Neither the blank-customer row nor the older week resolves to a unique name.
    assert_eq!(cleaned.unmapped.unique_customers, 2);
    assert!(temp_dir.path().join("unmapped_unique_customers.xlsx").is_file());

    let path = controllers::generate(
        &store,
        &config,
        &GenerateOptions {
            name: "booking".to_string(),
            owner: "comm".to_string(),
            history: 1,
            field_config: vec!["r:standard_cost".to_string()],
            csv: true,
            ..GenerateOptions::default()
        },
    )
    .expect("generated");

    assert!(path.starts_with(temp_dir.path()));
    let content = std::fs::read_to_string(path).expect("csv readable");
    assert!(content.lines().next().unwrap().ends_with("booking_net,base_list"));
    assert!(content.contains("1500"));
}
