mod test_coordinates_scenarios;
mod test_image_scenarios;
