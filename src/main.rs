use kscatter::app::run;
fn main() {
    run().unwrap();
}
