//! XPath selectors of the booking UI

pub const CONSENT_CLOSE: &str = "//a[contains(@class,'cookies-info-close')][1]";

/// Radio "access code already available"
pub const HAVE_CODE: &str = r#"//input[@name="vaccination-approval-checked"]/.."#;

pub const CODE_INPUT: &str = r#"//input[@name="ets-input-code-0"]"#;

pub const CODE_SUBMIT: &str = r#"//app-corona-vaccination-yes//button[@type="submit"]"#;

pub const OPEN_SLOT_SEARCH: &str = r##"//button[@data-target="#itsSearchAppointmentsModal"]"##;

/// First offered slot pair in the search modal
pub const FIRST_SLOT: &str =
    r#"//*[@id="itsSearchAppointmentsModal"]/div/div/div[2]/div/div/form/div[1]/div[2]/label/div[2]/div"#;

pub const SLOT_SUBMIT: &str = r#"//*[@id="itsSearchAppointmentsModal"]//button[@type="submit"]"#;

/// "Enter personal data"
pub const OPEN_CONTACT_FORM: &str = "/html/body/app-root/div/app-page-its-search/div/div/div[2]/div/div/div[5]/div/div[2]/div[2]/div[2]/button";

pub const CONTACT_SUBMIT: &str = r#"//*[@id="itsSearchContactModal"]//button[@type="submit"]"#;

pub const CONFIRM_BOOKING: &str = "/html/body/app-root/div/app-page-its-search/div/div/div[2]/div/div/div[5]/div/div[3]/div[2]/div[2]/button";

/// Text shown once a booking went through
pub const BOOKED_MARKER: &str = "Ihr Termin am";

const SALUTATIONS: [&str; 4] = ["Herr", "Frau", "Kind", "Divers"];

/// Radio button for a salutation; unknown values fall back to "Divers"
pub fn salutation(value: &str) -> String {
    let value = if SALUTATIONS.contains(&value) {
        value
    } else {
        "Divers"
    };
    format!(
        r#"//*[@id="itsSearchContactModal"]//app-booking-contact-form//div[contains(@class,"ets-radio-wrapper")]/label[@class="ets-radio-control"]/span[contains(text(),"{value}")]"#
    )
}

/// Text input of the contact form by its form control name
pub fn contact_input(control: &str) -> String {
    format!(
        r#"//*[@id="itsSearchContactModal"]//app-booking-contact-form//input[@formcontrolname="{control}"]"#
    )
}
