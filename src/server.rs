use std::sync::Arc;

use rocket::{catchers, http::Status, routes, Build, Request, Rocket};

use crate::{
    jump::jump,
    receiver::{Receiver, Termination},
    webhooks::{commit_receiver, github_receiver},
};

/// Plain-text bodies for anything the routes themselves didn't answer.
#[rocket::catch(default)]
fn plain_text(status: Status, _request: &Request<'_>) -> Termination {
    Termination::with_status(status, status.reason().unwrap_or("Error"))
}

pub fn build(receiver: Arc<Receiver>) -> Rocket<Build> {
    mount(rocket::build(), receiver)
}

fn mount(rocket: Rocket<Build>, receiver: Arc<Receiver>) -> Rocket<Build> {
    rocket
        .mount("/", routes![github_receiver, commit_receiver, jump])
        .register("/", catchers![plain_text])
        .manage(receiver)
}
